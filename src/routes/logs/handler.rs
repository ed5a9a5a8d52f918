use axum::{
    Extension,
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use super::model::{RecordLogRequest, RecordLogResponse};
use crate::AppState;
use crate::cache::keys::{
    LOGS_UPDATES_CHANNEL, USAGE_DAILY_PATTERN, USAGE_STATS_KEY, USAGE_TOP_KEY, usage_client_pattern,
};
use crate::error::AppError;
use crate::infrastructure::TaskError;
use crate::usage::ApiLog;
use crate::utils::success_to_api_response;

/// 记录一次 API 调用
///
/// 限流通过后写入数据源，缓存失效和事件发布在后台完成，不影响响应。
#[axum::debug_handler]
pub async fn record_log(
    State(state): State<AppState>,
    Json(req): Json<RecordLogRequest>,
) -> Result<Response, AppError> {
    let entry = req.validate()?;

    let decision = state.limiter.check_limit(&entry.client_id.to_string()).await;
    if !decision.allowed {
        let rejected = AppError::RateLimited {
            limit: decision.limit,
            reset_at: decision.reset_at,
        };
        return Ok((Extension(decision), rejected).into_response());
    }

    let log = state.usage.record(entry).await?;
    tracing::debug!(client_id = %log.client_id, endpoint = %log.endpoint, "API hit recorded");

    invalidate_usage_cache(&state, log.client_id);
    publish_log_update(&state, &log);

    let body = RecordLogResponse {
        log_id: log.id,
        timestamp: log.timestamp,
        remaining_requests: decision.remaining,
    };
    Ok((
        StatusCode::CREATED,
        Extension(decision),
        success_to_api_response(body),
    )
        .into_response())
}

fn invalidate_usage_cache(state: &AppState, client_id: Uuid) {
    let cache = state.cache.clone();
    state.tasks.spawn("invalidate_usage_cache", async move {
        if !cache.is_available().await {
            tracing::warn!(client_id = %client_id, "Store unavailable, skipping cache invalidation");
            return Ok::<(), TaskError>(());
        }

        cache.try_invalidate_pattern(USAGE_DAILY_PATTERN).await?;
        cache
            .try_invalidate_pattern(&usage_client_pattern(&client_id.to_string()))
            .await?;
        cache.try_delete(&[USAGE_TOP_KEY, USAGE_STATS_KEY]).await?;
        tracing::debug!(client_id = %client_id, "Usage cache invalidated");
        Ok::<(), TaskError>(())
    });
}

fn publish_log_update(state: &AppState, log: &ApiLog) {
    let bus = state.bus.clone();
    let data = json!({
        "client_id": log.client_id,
        "endpoint": log.endpoint,
        "timestamp": log.timestamp,
    });
    state.tasks.spawn("publish_log_update", async move {
        match bus.publish(LOGS_UPDATES_CHANNEL, "log_recorded", &data).await {
            Ok(_) => Ok::<(), TaskError>(()),
            Err(e) if e.is_unavailable() => {
                tracing::warn!(error = %e, "Store unavailable, log update not published");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    });
}
