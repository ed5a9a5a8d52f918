use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use super::model::{CachedResponse, DAILY_WINDOW_DAYS, TOP_CLIENTS_LIMIT, TOP_CLIENTS_WINDOW};
use crate::AppState;
use crate::cache::keys::{USAGE_STATS_KEY, USAGE_TOP_KEY, usage_client_key, usage_daily_key};
use crate::error::AppError;
use crate::usage::{DailyUsage, TopClient, UsageStats, overall_stats};
use crate::utils::success_to_api_response;

/// 最近 7 天每个客户端每天的调用数
#[axum::debug_handler]
pub async fn daily_usage(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let usage = state.usage.clone();
    let lookup = state
        .cache
        .get_or_compute(
            &usage_daily_key(DAILY_WINDOW_DAYS),
            state.config.cache_ttl(),
            move || async move { usage.daily_usage(DAILY_WINDOW_DAYS).await },
        )
        .await?;

    Ok(success_to_api_response(CachedResponse::<Vec<DailyUsage>>::from(lookup)))
}

/// 最近 24 小时调用最多的客户端
///
/// 命中缓存时检查剩余存活时间，临近过期则在后台预取。
#[axum::debug_handler]
pub async fn top_clients(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let ttl = state.config.cache_ttl();
    let usage = state.usage.clone();
    let lookup = state
        .cache
        .get_or_compute(USAGE_TOP_KEY, ttl, move || async move {
            usage.top_clients(TOP_CLIENTS_LIMIT, TOP_CLIENTS_WINDOW).await
        })
        .await?;

    if lookup.from_cache {
        let usage = state.usage.clone();
        state.prefetch.maybe_refresh(
            USAGE_TOP_KEY.to_string(),
            ttl,
            state.config.prefetch_threshold,
            move || async move { usage.top_clients(TOP_CLIENTS_LIMIT, TOP_CLIENTS_WINDOW).await },
        );
    }

    Ok(success_to_api_response(CachedResponse::<Vec<TopClient>>::from(lookup)))
}

#[axum::debug_handler]
pub async fn client_usage(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = Uuid::parse_str(client_id.trim())
        .map_err(|_| AppError::BadRequest("invalid client_id format".into()))?;
    if !state.usage.has_client(client_id).await? {
        return Err(AppError::NotFound("Client not found".into()));
    }

    let usage = state.usage.clone();
    let lookup = state
        .cache
        .get_or_compute(
            &usage_client_key(&client_id.to_string(), DAILY_WINDOW_DAYS),
            state.config.cache_ttl(),
            move || async move { usage.daily_usage_by_client(client_id, DAILY_WINDOW_DAYS).await },
        )
        .await?;

    Ok(success_to_api_response(CachedResponse::<Vec<DailyUsage>>::from(lookup)))
}

/// 总体统计，使用较短的缓存时间
#[axum::debug_handler]
pub async fn usage_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let usage = state.usage.clone();
    let lookup = state
        .cache
        .get_or_compute(USAGE_STATS_KEY, state.config.stats_cache_ttl(), move || async move {
            overall_stats(usage.as_ref(), Utc::now()).await
        })
        .await?;

    Ok(success_to_api_response(CachedResponse::<UsageStats>::from(lookup)))
}
