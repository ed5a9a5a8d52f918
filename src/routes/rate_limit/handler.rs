use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;
use crate::utils::success_to_api_response;

#[derive(Debug, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub client_id: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// 与写入日志时相同的规范形式：小写、带连字符
fn canonical_client_id(raw: &str) -> Result<String, AppError> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| AppError::BadRequest("invalid client_id format".into()))
}

/// 查询剩余次数，不计数
#[axum::debug_handler]
pub async fn get_rate_limit(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = canonical_client_id(&client_id)?;
    let decision = state.limiter.get_remaining(&client_id).await;
    let status = RateLimitStatus {
        client_id,
        limit: decision.limit,
        remaining: decision.remaining,
        reset_at: decision.reset_at,
    };
    Ok((Extension(decision), success_to_api_response(status)))
}

/// 手动清除当前小时的计数
#[axum::debug_handler]
pub async fn reset_rate_limit(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = canonical_client_id(&client_id)?;
    state.limiter.reset_limit(&client_id).await?;
    Ok(success_to_api_response(json!({ "client_id": client_id, "reset": true })))
}
