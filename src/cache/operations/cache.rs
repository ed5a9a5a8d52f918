use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::store::{BackingStore, StoreResult, is_pattern};

/// 读取结果，`from_cache` 表示是否命中缓存
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<T> {
    pub value: T,
    pub from_cache: bool,
}

/// 通用缓存操作
///
/// 存储不可用时 `get` 总是未命中，`set`/`delete` 静默成功，
/// 调用方始终可以回退到数据源。
#[derive(Clone)]
pub struct CacheOperations {
    store: Arc<dyn BackingStore>,
}

impl CacheOperations {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self { store }
    }

    pub async fn is_available(&self) -> bool {
        self.store.ping().await
    }

    /// 读取并反序列化，反序列化失败按未命中处理
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Cache read degraded to miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cached value failed to decode");
                None
            }
        }
    }

    /// 序列化失败时放弃写入
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache write abandoned, value failed to encode");
                return;
            }
        };

        if let Err(e) = self.store.set(key, &json, ttl).await {
            tracing::debug!(key = %key, error = %e, "Cache write skipped");
        }
    }

    pub async fn delete<K: AsRef<str>>(&self, keys: &[K]) -> u64 {
        self.try_delete(keys).await.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Cache delete skipped");
            0
        })
    }

    pub async fn try_delete<K: AsRef<str>>(&self, keys: &[K]) -> StoreResult<u64> {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        self.store.delete(&keys).await
    }

    /// 按模式批量删除，返回删除数量
    ///
    /// 先游标扫描再一次性删除，与并发写入之间不是原子的：
    /// 扫描期间新写入的键可能被删除也可能被保留。
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        self.try_invalidate_pattern(pattern)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!(pattern = %pattern, error = %e, "Pattern invalidation skipped");
                0
            })
    }

    pub async fn try_invalidate_pattern(&self, pattern: &str) -> StoreResult<u64> {
        let keys = self.store.scan(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete(&keys).await?;
        tracing::debug!(pattern = %pattern, removed, "Cache pattern invalidated");
        Ok(removed)
    }

    /// 单个键或模式
    pub async fn invalidate(&self, key_or_pattern: &str) -> u64 {
        if is_pattern(key_or_pattern) {
            self.invalidate_pattern(key_or_pattern).await
        } else {
            self.delete(&[key_or_pattern]).await
        }
    }

    pub async fn try_invalidate(&self, key_or_pattern: &str) -> StoreResult<u64> {
        if is_pattern(key_or_pattern) {
            self.try_invalidate_pattern(key_or_pattern).await
        } else {
            self.try_delete(&[key_or_pattern]).await
        }
    }

    /// 剩余存活时间，未知时返回 None
    pub async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.store.ttl(key).await.ok().flatten()
    }

    /// 读穿缓存：命中直接返回，未命中则计算并回写
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Lookup<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(Lookup {
                value,
                from_cache: true,
            });
        }

        let value = compute().await?;
        self.set(key, &value, ttl).await;
        Ok(Lookup {
            value,
            from_cache: false,
        })
    }
}
