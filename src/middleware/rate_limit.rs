use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::cache::RateDecision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// 处理器把限流结果放进响应扩展，这里统一写成响应头
pub async fn rate_limit_headers(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;

    if let Some(decision) = response.extensions().get::<RateDecision>().cloned() {
        apply_headers(response.headers_mut(), &decision);
    }
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at.timestamp()));
}
