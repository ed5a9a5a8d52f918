use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use super::CacheOperations;
use crate::infrastructure::{BackgroundTasks, TaskError};

/// 预取刷新
///
/// 热点键的剩余存活时间低于阈值时，在后台重新计算并回写，
/// 读请求因此很少遇到未命中。重复刷新是幂等的，这里没有单飞保护，
/// 临界点附近的并发读可能触发多次重复计算。
#[derive(Clone)]
pub struct PrefetchRefresher {
    cache: CacheOperations,
    tasks: BackgroundTasks,
}

impl PrefetchRefresher {
    pub fn new(cache: CacheOperations, tasks: BackgroundTasks) -> Self {
        Self { cache, tasks }
    }

    /// 后台检查并刷新，立即返回
    pub fn maybe_refresh<T, E, F, Fut>(&self, key: String, ttl: Duration, threshold: f64, compute: F)
    where
        T: Serialize + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let this = self.clone();
        self.tasks.spawn("prefetch", async move {
            this.refresh_if_stale(&key, ttl, threshold, compute).await;
            Ok::<(), TaskError>(())
        });
    }

    /// 剩余存活时间低于 `ttl * threshold` 时重新计算，返回是否刷新成功
    ///
    /// 计算失败只记录日志，原有的缓存值保持可用直到自然过期。
    pub async fn refresh_if_stale<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        threshold: f64,
        compute: F,
    ) -> bool
    where
        T: Serialize,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(remaining) = self.cache.remaining_ttl(key).await else {
            return false;
        };

        if !threshold.is_finite() {
            tracing::warn!(key = %key, threshold, "Invalid prefetch threshold, skipping refresh");
            return false;
        }
        let cutoff = ttl.mul_f64(threshold.clamp(0.0, 1.0));
        if remaining.is_zero() || remaining >= cutoff {
            return false;
        }

        tracing::debug!(key = %key, remaining_secs = remaining.as_secs(), "Prefetching cache entry");
        match compute().await {
            Ok(value) => {
                self.cache.set(key, &value, ttl).await;
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Prefetch recompute failed, keeping cached value");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::USAGE_TOP_KEY;
    use crate::cache::store::MemoryStore;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(3600);
    const THRESHOLD: f64 = 300.0 / 3600.0;

    fn refresher() -> (CacheOperations, BackgroundTasks, PrefetchRefresher) {
        let cache = CacheOperations::new(Arc::new(MemoryStore::new()));
        let tasks = BackgroundTasks::new(4);
        let refresher = PrefetchRefresher::new(cache.clone(), tasks.clone());
        (cache, tasks, refresher)
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_are_left_alone() {
        let (cache, _, refresher) = refresher();
        cache.set(USAGE_TOP_KEY, &1u32, TTL).await;

        let refreshed = refresher
            .refresh_if_stale(USAGE_TOP_KEY, TTL, THRESHOLD, || async { Ok::<_, String>(2u32) })
            .await;
        assert!(!refreshed);
        assert_eq!(cache.get::<u32>(USAGE_TOP_KEY).await, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_near_expiry_are_recomputed_with_fresh_ttl() {
        let (cache, _, refresher) = refresher();
        cache.set(USAGE_TOP_KEY, &1u32, TTL).await;
        tokio::time::advance(Duration::from_secs(3500)).await;

        let refreshed = refresher
            .refresh_if_stale(USAGE_TOP_KEY, TTL, THRESHOLD, || async { Ok::<_, String>(2u32) })
            .await;
        assert!(refreshed);
        assert_eq!(cache.get::<u32>(USAGE_TOP_KEY).await, Some(2));
        assert_eq!(cache.remaining_ttl(USAGE_TOP_KEY).await, Some(TTL));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_recompute_keeps_previous_value() {
        let (cache, _, refresher) = refresher();
        cache.set(USAGE_TOP_KEY, &1u32, TTL).await;
        tokio::time::advance(Duration::from_secs(3500)).await;

        let refreshed = refresher
            .refresh_if_stale(USAGE_TOP_KEY, TTL, THRESHOLD, || async {
                Err::<u32, _>("database unavailable")
            })
            .await;
        assert!(!refreshed);
        assert_eq!(cache.get::<u32>(USAGE_TOP_KEY).await, Some(1));
        assert_eq!(
            cache.remaining_ttl(USAGE_TOP_KEY).await,
            Some(Duration::from_secs(100))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_finite_threshold_never_refreshes() {
        let (cache, _, refresher) = refresher();
        cache.set(USAGE_TOP_KEY, &1u32, TTL).await;
        tokio::time::advance(Duration::from_secs(3500)).await;

        for threshold in [f64::NAN, f64::INFINITY] {
            let refreshed = refresher
                .refresh_if_stale(USAGE_TOP_KEY, TTL, threshold, || async { Ok::<_, String>(2u32) })
                .await;
            assert!(!refreshed);
        }
        assert_eq!(cache.get::<u32>(USAGE_TOP_KEY).await, Some(1));
    }

    #[tokio::test]
    async fn missing_entries_are_not_prefetched() {
        let (_, _, refresher) = refresher();
        let refreshed = refresher
            .refresh_if_stale(USAGE_TOP_KEY, TTL, THRESHOLD, || async { Ok::<_, String>(2u32) })
            .await;
        assert!(!refreshed);
    }

    #[tokio::test(start_paused = true)]
    async fn background_refresh_never_reports_errors() {
        let (cache, tasks, refresher) = refresher();
        cache.set(USAGE_TOP_KEY, &1u32, TTL).await;
        tokio::time::advance(Duration::from_secs(3500)).await;

        refresher.maybe_refresh(USAGE_TOP_KEY.to_string(), TTL, THRESHOLD, || async {
            Err::<u32, _>("boom")
        });
        assert!(tasks.shutdown(Duration::from_secs(1)).await);

        assert_eq!(tasks.failures(), 0);
        assert_eq!(cache.get::<u32>(USAGE_TOP_KEY).await, Some(1));
    }
}
