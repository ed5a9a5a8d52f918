use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;

use super::{
    BackingStore, Increment, PayloadStream, StoreError, StoreResult, glob_match,
};

const CHANNEL_CAPACITY: usize = 256;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 进程内存储
///
/// 语义与 Redis 实现一致：过期、模式扫描、有上限的原子自增和广播式发布订阅。
/// `set_available(false)` 可以模拟存储宕机。
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".into()))
        }
    }

    /// 读取前顺带清理已过期的键
    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    fn parse_counter(entry: Option<&mut Entry>) -> StoreResult<i64> {
        match entry {
            Some(entry) => entry
                .value
                .parse::<i64>()
                .map_err(|_| StoreError::Command("value is not an integer".into())),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn ping(&self) -> bool {
        self.ensure_available().is_ok()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.ensure_available()?;
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.ensure_available()?;
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.ensure_available()?;
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|k| entries.remove(k))
            .filter(|e| !e.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.ensure_available()?;
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, e| !e.is_expired(now));
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.ensure_available()?;
        let mut entries = self.entries.lock().await;
        let next = Self::parse_counter(Self::live(&mut entries, key))? + 1;
        match Self::live(&mut entries, key) {
            Some(entry) => entry.value = next.to_string(),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: next.to_string(),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.ensure_available()?;
        let mut entries = self.entries.lock().await;
        Ok(match Self::live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        })
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.ensure_available()?;
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(Self::live(&mut entries, key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn incr_bounded(&self, key: &str, limit: i64, ttl: Duration) -> StoreResult<Increment> {
        self.ensure_available()?;
        // 整个判断-自增-设置过期都在同一把锁内完成
        let mut entries = self.entries.lock().await;
        let current = Self::parse_counter(Self::live(&mut entries, key))?;
        if current >= limit {
            return Ok(Increment::Saturated(current));
        }

        let count = current + 1;
        let now = Instant::now();
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: String::new(),
            expires_at: None,
        });
        entry.value = count.to_string();
        if count == 1 || entry.expires_at.is_none() {
            entry.expires_at = Some(now + ttl);
        }
        Ok(Increment::Counted(count))
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<u64> {
        self.ensure_available()?;
        let channels = self.channels.lock().await;
        let delivered = channels
            .get(channel)
            .and_then(|tx| tx.send(payload.to_string()).ok())
            .unwrap_or(0);
        Ok(delivered as u64)
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<PayloadStream> {
        self.ensure_available()?;
        let rx = self
            .channels
            .lock()
            .await
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let channel = channel.to_string();
        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            let result = match item {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "Subscriber lagged behind");
                    None
                }
            };
            async move { result }
        });
        Ok(Box::pin(stream))
    }

    async fn close(&self) {
        // 关闭所有频道，订阅流随之结束
        self.channels.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .set("usage:top:24h", "[]", Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(
            store.ttl("usage:top:24h").await.unwrap(),
            Some(Duration::from_secs(6))
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("usage:top:24h").await.unwrap(), None);
        assert_eq!(store.ttl("usage:top:24h").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_and_delete_by_pattern() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set("usage:daily:7days", "1", ttl).await.unwrap();
        store.set("usage:daily:30days", "2", ttl).await.unwrap();
        store.set("usage:top:24h", "3", ttl).await.unwrap();

        let found = store.scan("usage:daily:*").await.unwrap();
        assert_eq!(found, keys(&["usage:daily:30days", "usage:daily:7days"]));
        assert_eq!(store.delete(&found).await.unwrap(), 2);
        assert_eq!(store.delete(&found).await.unwrap(), 0);
        assert!(store.get("usage:top:24h").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bounded_increment_stops_at_limit() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(
            store.incr_bounded("k", 2, ttl).await.unwrap(),
            Increment::Counted(1)
        );
        assert_eq!(
            store.incr_bounded("k", 2, ttl).await.unwrap(),
            Increment::Counted(2)
        );
        assert_eq!(
            store.incr_bounded("k", 2, ttl).await.unwrap(),
            Increment::Saturated(2)
        );
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_increment_keeps_window_ttl() {
        let store = MemoryStore::new();
        store
            .incr_bounded("k", 10, Duration::from_secs(100))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;
        store
            .incr_bounded("k", 10, Duration::from_secs(100))
            .await
            .unwrap();

        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn bounded_increment_repairs_missing_expiry() {
        let store = MemoryStore::new();
        store.incr("k").await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), None);

        store
            .incr_bounded("k", 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(store.ttl("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let store = MemoryStore::new();
        assert_eq!(store.publish("api_logs:updates", "{}").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_messages_in_order() {
        let store = MemoryStore::new();
        let mut stream = store.subscribe("api_logs:updates").await.unwrap();
        store.publish("api_logs:updates", "one").await.unwrap();
        store.publish("api_logs:updates", "two").await.unwrap();
        store.publish("other", "ignored").await.unwrap();

        assert_eq!(stream.next().await.as_deref(), Some("one"));
        assert_eq!(stream.next().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn unavailable_store_rejects_every_operation() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(!store.ping().await);
        assert!(store.get("k").await.unwrap_err().is_unavailable());
        assert!(store.incr("k").await.unwrap_err().is_unavailable());
        assert!(store.subscribe("c").await.is_err());

        store.set_available(true);
        assert!(store.ping().await);
    }
}
