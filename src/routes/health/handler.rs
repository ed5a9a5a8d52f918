use axum::{extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;

use crate::AppState;
use crate::utils::success_to_api_response;

/// 服务存活检查，存储不可用时仍返回 200，只标记为降级
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_up = state.cache.is_available().await;
    (
        StatusCode::OK,
        success_to_api_response(json!({
            "status": if store_up { "healthy" } else { "degraded" },
            "store": if store_up { "up" } else { "down" },
            "timestamp": Utc::now(),
        })),
    )
}
