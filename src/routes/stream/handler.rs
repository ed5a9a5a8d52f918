use std::convert::Infallible;

use axum::{
    extract::State,
    http::{HeaderName, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use futures_util::{Stream, StreamExt};

use crate::AppState;
use crate::cache::keys::{LOGS_UPDATES_CHANNEL, USAGE_TOP_KEY};
use crate::error::AppError;
use crate::live::{LiveFrame, PollingConfig, SessionConfig, open_live_session, open_polling_session};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// 订阅 API 调用记录的实时更新
#[axum::debug_handler]
pub async fn stream_usage(State(state): State<AppState>) -> Result<Response, AppError> {
    if !state.cache.is_available().await {
        return Err(AppError::ServiceUnavailable(
            "Real-time updates are not available".into(),
        ));
    }

    let config = SessionConfig {
        heartbeat: state.config.heartbeat_interval(),
    };
    let frames =
        open_live_session(&state.bus, LOGS_UPDATES_CHANNEL, config, state.shutdown.clone()).await?;
    Ok(event_stream(frames))
}

/// 定时推送缓存中的前几名客户端
#[axum::debug_handler]
pub async fn stream_top_clients(State(state): State<AppState>) -> Response {
    let config = PollingConfig {
        key: USAGE_TOP_KEY.to_string(),
        event: "top_clients".to_string(),
        poll_every: state.config.top_clients_poll(),
        heartbeat: state.config.heartbeat_interval(),
    };
    let frames = open_polling_session(state.cache.clone(), config, state.shutdown.clone());
    event_stream(frames)
}

fn event_stream<S>(frames: S) -> Response
where
    S: Stream<Item = LiveFrame> + Send + 'static,
{
    let events = frames.map(|frame| {
        Ok::<_, Infallible>(Event::default().event(frame.event).data(frame.data.to_string()))
    });
    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(events),
    )
        .into_response()
}
