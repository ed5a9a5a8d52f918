mod frame;
mod polling;
mod session;

use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

use crate::cache::{CacheOperations, EventBus};

pub use frame::LiveFrame;
pub use polling::{PollingConfig, PollingSession};
pub use session::{LiveSession, SessionConfig, SessionEnd, SessionError, SessionState};

/// 每个会话到客户端之间的缓冲帧数，写满时会话等待客户端读取
pub const FRAME_BUFFER: usize = 32;

/// 订阅频道并在独立任务中运行会话，返回给客户端的帧流
///
/// 订阅失败直接返回错误，此时没有任何帧发出。
/// 帧流被丢弃即视为客户端断开，会话随之结束并释放订阅。
pub async fn open_live_session(
    bus: &EventBus,
    channel: &str,
    config: SessionConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<ReceiverStream<LiveFrame>, SessionError> {
    let session = LiveSession::open(bus, channel, config).await?;
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(session.run(tx, shutdown));
    Ok(ReceiverStream::new(rx))
}

pub fn open_polling_session(
    cache: CacheOperations,
    config: PollingConfig,
    shutdown: watch::Receiver<bool>,
) -> ReceiverStream<LiveFrame> {
    let session = PollingSession::new(cache, config);
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(session.run(tx, shutdown));
    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::LOGS_UPDATES_CHANNEL;
    use crate::cache::store::MemoryStore;
    use futures_util::StreamExt;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn subscribers_each_receive_every_update() {
        let bus = EventBus::new(Arc::new(MemoryStore::new()));
        let (_stop, shutdown) = watch::channel(false);

        let mut first = open_live_session(&bus, LOGS_UPDATES_CHANNEL, SessionConfig::default(), shutdown.clone())
            .await
            .unwrap();
        let mut second = open_live_session(&bus, LOGS_UPDATES_CHANNEL, SessionConfig::default(), shutdown)
            .await
            .unwrap();
        assert_eq!(first.next().await.unwrap().event, "connected");
        assert_eq!(second.next().await.unwrap().event, "connected");

        let receivers = bus
            .publish(LOGS_UPDATES_CHANNEL, "log_recorded", &json!({"client_id": "c1"}))
            .await
            .unwrap();
        assert_eq!(receivers, 2);

        for stream in [&mut first, &mut second] {
            let frame = stream.next().await.unwrap();
            assert_eq!(frame.event, "log_recorded");
            assert_eq!(frame.data["data"]["client_id"], "c1");
        }
    }

    #[tokio::test]
    async fn subscription_failure_emits_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let bus = EventBus::new(store);
        let (_stop, shutdown) = watch::channel(false);

        let result = open_live_session(&bus, LOGS_UPDATES_CHANNEL, SessionConfig::default(), shutdown).await;
        assert!(matches!(result, Err(SessionError::Subscribe(_))));
    }
}
