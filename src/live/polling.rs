use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::LiveFrame;
use super::session::{SessionCore, SessionEnd, SessionError, SessionState, shutdown_requested, ticker};
use crate::cache::CacheOperations;

#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// 轮询的缓存键，同时作为会话主题
    pub key: String,
    /// 命中时推送的事件名
    pub event: String,
    pub poll_every: Duration,
    pub heartbeat: Duration,
}

/// 轮询缓存聚合值的实时会话
///
/// 不订阅事件总线，定时读取缓存：命中则推送缓存内容，
/// 缺失则推送 "refreshing" 通知。
pub struct PollingSession {
    core: SessionCore,
    cache: CacheOperations,
    config: PollingConfig,
}

impl PollingSession {
    pub fn new(cache: CacheOperations, config: PollingConfig) -> Self {
        Self {
            core: SessionCore::new(&config.key),
            cache,
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn state(&self) -> SessionState {
        self.core.state
    }

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
            .connect(tx, shutdown, "Successfully connected to top clients stream")
            .await?
        {
            return Ok(end);
        }

        let mut poll = ticker(self.config.poll_every);
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
                _ = poll.tick() => {
                    let Some(frame) = self.snapshot().await else { continue };
                    if let Some(end) = self.core.deliver(tx, shutdown, frame).await? {
                        return Ok(end);
                    }
                }
            }
        }
    }

    /// 存储不可用时本轮不推送
    async fn snapshot(&self) -> Option<LiveFrame> {
        if !self.cache.is_available().await {
            tracing::debug!(session_id = %self.core.id, "Store unavailable, skipping poll");
            return None;
        }

        let frame = match self.cache.get::<Value>(&self.config.key).await {
            Some(data) => LiveFrame::new(
                self.config.event.clone(),
                json!({
                    "data": data,
                    "timestamp": Utc::now(),
                    "source": "cache",
                }),
            ),
            None => LiveFrame::new(
                "refreshing",
                json!({
                    "message": "Data is being refreshed",
                    "timestamp": Utc::now(),
                }),
            ),
        };
        Some(frame)
    }
}
