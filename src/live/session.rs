use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use super::LiveFrame;
use crate::cache::store::StoreError;
use crate::cache::{EventBus, EventStream, Inbound};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Closed,
}

/// 正常结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// 客户端断开或服务关闭
    Cancelled,
    /// 订阅被存储端断开
    SourceClosed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("subscription failed: {0}")]
    Subscribe(#[from] StoreError),
    #[error("client transport closed while delivering a frame")]
    Delivery,
}

/// 会话的公共部分：标识、状态和投递
pub(crate) struct SessionCore {
    pub(crate) id: Uuid,
    pub(crate) topic: String,
    pub(crate) state: SessionState,
    pub(crate) last_activity: DateTime<Utc>,
}

impl SessionCore {
    pub(crate) fn new(topic: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            state: SessionState::Connecting,
            last_activity: Utc::now(),
        }
    }

    /// 投递一帧；等待缓冲区空位期间也响应关闭信号
    ///
    /// 返回 `Some` 表示会话应当结束。对端在投递时已断开同样按取消处理。
    pub(crate) async fn deliver(
        &mut self,
        tx: &mpsc::Sender<LiveFrame>,
        shutdown: &mut watch::Receiver<bool>,
        frame: LiveFrame,
    ) -> Result<Option<SessionEnd>, SessionError> {
        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => Ok(Some(SessionEnd::Cancelled)),
            sent = tx.send(frame) => match sent {
                Ok(()) => {
                    self.last_activity = Utc::now();
                    Ok(None)
                }
                Err(_) if tx.is_closed() => Ok(Some(SessionEnd::Cancelled)),
                Err(_) => Err(SessionError::Delivery),
            },
        }
    }

    /// Connecting -> Streaming，连接帧送达后才进入 Streaming
    pub(crate) async fn connect(
        &mut self,
        tx: &mpsc::Sender<LiveFrame>,
        shutdown: &mut watch::Receiver<bool>,
        message: &str,
    ) -> Result<Option<SessionEnd>, SessionError> {
        let frame = LiveFrame::connected(self.id, &self.topic, message);
        if let Some(end) = self.deliver(tx, shutdown, frame).await? {
            return Ok(Some(end));
        }
        self.state = SessionState::Streaming;
        tracing::info!(session_id = %self.id, topic = %self.topic, "Live session streaming");
        Ok(None)
    }

    pub(crate) fn close(&mut self, result: &Result<SessionEnd, SessionError>) {
        self.state = SessionState::Closed;
        match result {
            Ok(end) => {
                tracing::info!(session_id = %self.id, topic = %self.topic, reason = ?end, "Live session closed")
            }
            Err(e) => {
                tracing::warn!(session_id = %self.id, topic = %self.topic, error = %e, "Live session failed")
            }
        }
    }
}

/// 固定间隔的计时器，第一次触发在一个周期之后
pub(crate) fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// 收到关闭信号时完成；发送端已经不存在时永不完成
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub heartbeat: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(30),
        }
    }
}

/// 订阅驱动的实时会话：Connecting -> Streaming -> Closed
pub struct LiveSession {
    core: SessionCore,
    events: EventStream,
    config: SessionConfig,
}

impl LiveSession {
    /// 先订阅再进入 Connecting，保证连接帧之后发布的消息都能收到
    pub async fn open(bus: &EventBus, channel: &str, config: SessionConfig) -> Result<Self, SessionError> {
        let events = bus.subscribe(channel).await?;
        Ok(Self {
            core: SessionCore::new(channel),
            events,
            config,
        })
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn state(&self) -> SessionState {
        self.core.state
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.core.last_activity
    }

    /// 运行到客户端断开、收到关闭信号、订阅结束或投递失败为止，结束时释放订阅
    pub async fn run(
        mut self,
        tx: mpsc::Sender<LiveFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SessionEnd, SessionError> {
        let result = self.stream(&tx, &mut shutdown).await;
        self.core.close(&result);
        result
    }

    async fn stream(
        &mut self,
        tx: &mpsc::Sender<LiveFrame>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, SessionError> {
        if let Some(end) = self
            .core
            .connect(tx, shutdown, "Successfully connected to real-time updates")
            .await?
        {
            return Ok(end);
        }

        let mut heartbeat = ticker(self.config.heartbeat);
        loop {
            tokio::select! {
                biased;
                _ = tx.closed() => return Ok(SessionEnd::Cancelled),
                _ = shutdown_requested(shutdown) => return Ok(SessionEnd::Cancelled),
                _ = heartbeat.tick() => {
                    if let Some(end) = self.core.deliver(tx, shutdown, LiveFrame::heartbeat()).await? {
                        return Ok(end);
                    }
                }
                inbound = self.events.next() => match inbound {
                    Some(Inbound::Event(envelope)) => {
                        let data = serde_json::to_value(&envelope).unwrap_or_default();
                        let frame = LiveFrame::new(envelope.kind, data);
                        if let Some(end) = self.core.deliver(tx, shutdown, frame).await? {
                            return Ok(end);
                        }
                    }
                    Some(Inbound::Malformed { payload, reason }) => {
                        tracing::warn!(
                            session_id = %self.core.id,
                            payload = %payload,
                            error = %reason,
                            "Dropping malformed live event"
                        );
                    }
                    None => return Ok(SessionEnd::SourceClosed),
                },
            }
        }
    }
}
