use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Serialize;

use crate::cache::models::EventEnvelope;
use crate::cache::store::{BackingStore, StoreError, StoreResult};

/// 订阅到的消息；`Malformed` 保留原始内容便于记录
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(EventEnvelope),
    Malformed { payload: String, reason: String },
}

pub type EventStream = BoxStream<'static, Inbound>;

/// 发布订阅封装
///
/// 发完即忘：不持久化、不重放，订阅前发布的消息收不到。
#[derive(Clone)]
pub struct EventBus {
    store: Arc<dyn BackingStore>,
}

impl EventBus {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self { store }
    }

    /// 包装成信封后发布，返回收到消息的订阅者数量
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        kind: &str,
        data: &T,
    ) -> StoreResult<u64> {
        let data = serde_json::to_value(data).map_err(|e| StoreError::Command(e.to_string()))?;
        self.publish_envelope(channel, &EventEnvelope::new(kind, data))
            .await
    }

    pub async fn publish_envelope(&self, channel: &str, envelope: &EventEnvelope) -> StoreResult<u64> {
        let payload =
            serde_json::to_string(envelope).map_err(|e| StoreError::Command(e.to_string()))?;
        let receivers = self.store.publish(channel, &payload).await?;
        tracing::debug!(channel = %channel, kind = %envelope.kind, receivers, "Event published");
        Ok(receivers)
    }

    /// 惰性的无限消息流，丢弃即取消订阅
    pub async fn subscribe(&self, channel: &str) -> StoreResult<EventStream> {
        let payloads = self.store.subscribe(channel).await?;
        tracing::debug!(channel = %channel, "Subscribed");
        Ok(Box::pin(payloads.map(|payload| {
            match serde_json::from_str::<EventEnvelope>(&payload) {
                Ok(envelope) => Inbound::Event(envelope),
                Err(e) => Inbound::Malformed {
                    payload,
                    reason: e.to_string(),
                },
            }
        })))
    }
}
