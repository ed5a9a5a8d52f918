use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use crate::{
    AppState,
    middleware::{log_errors, rate_limit_headers},
    routes,
};

// 日志写入与限流管理
fn log_routes() -> Router<AppState> {
    Router::new()
        .route("/logs", post(routes::logs::record_log))
        .route(
            "/rate-limit/{client_id}",
            get(routes::rate_limit::get_rate_limit).delete(routes::rate_limit::reset_rate_limit),
        )
}

// 用量查询
fn usage_routes() -> Router<AppState> {
    Router::new()
        .route("/usage/daily", get(routes::usage::daily_usage))
        .route("/usage/top", get(routes::usage::top_clients))
        .route("/usage/client/{client_id}", get(routes::usage::client_usage))
        .route("/usage/stats", get(routes::usage::usage_stats))
}

// 实时推送
fn stream_routes() -> Router<AppState> {
    Router::new()
        .route("/stream/usage", get(routes::stream::stream_usage))
        .route("/stream/top", get(routes::stream::stream_top_clients))
}

/// 创建主路由，业务接口挂在 `api_base_uri` 之下
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(log_routes())
        .merge(usage_routes())
        .merge(stream_routes());

    let base = state.config.api_base_uri.trim_matches('/');
    let router = Router::new().route("/health", get(routes::health::health));
    let router = if base.is_empty() {
        router.merge(api)
    } else {
        router.nest(&format!("/{base}"), api)
    };

    router
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(log_errors))
                .layer(axum::middleware::from_fn(rate_limit_headers)),
        )
        .with_state(state)
}
