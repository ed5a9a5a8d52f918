use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::keys::rate_limit_key;
use crate::cache::models::RateDecision;
use crate::cache::store::{BackingStore, Increment, StoreResult};
use crate::infrastructure::{Clock, SystemClock};

const BUCKET_SECS: i64 = 3600;

/// 按客户端、按自然小时计数的固定窗口限流
///
/// 判断、自增、设置过期由存储端的一次原子操作完成，
/// 计数器只在从无到 1 时设置过期，窗口不会被中途重置。
/// 存储不可用时放行。
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn BackingStore>,
    max_per_hour: u32,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn BackingStore>, max_per_hour: u32) -> Self {
        Self::with_clock(store, max_per_hour, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn BackingStore>, max_per_hour: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            max_per_hour,
            clock,
        }
    }

    pub fn max_per_hour(&self) -> u32 {
        self.max_per_hour
    }

    /// 检查并计数
    pub async fn check_limit(&self, client_id: &str) -> RateDecision {
        let now = self.clock.now();
        let key = rate_limit_key(client_id, now);
        let (window_left, reset_at) = bucket_end(now);
        let limit = self.max_per_hour;

        match self
            .store
            .incr_bounded(&key, i64::from(limit), window_left)
            .await
        {
            Ok(Increment::Counted(count)) => RateDecision {
                allowed: true,
                remaining: remaining(limit, count),
                limit,
                reset_at,
            },
            Ok(Increment::Saturated(count)) => {
                tracing::info!(client_id = %client_id, count, limit, "Rate limit exceeded");
                RateDecision {
                    allowed: false,
                    remaining: 0,
                    limit,
                    reset_at,
                }
            }
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "Rate limiter failing open");
                RateDecision::fail_open(limit, reset_at)
            }
        }
    }

    /// 只读查询剩余次数，同样在存储不可用时放行
    pub async fn get_remaining(&self, client_id: &str) -> RateDecision {
        let now = self.clock.now();
        let key = rate_limit_key(client_id, now);
        let (_, reset_at) = bucket_end(now);
        let limit = self.max_per_hour;

        let count = match self.store.get(&key).await {
            Ok(value) => value.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0),
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "Rate limit lookup failing open");
                return RateDecision::fail_open(limit, reset_at);
            }
        };

        let remaining = remaining(limit, count);
        RateDecision {
            allowed: remaining > 0,
            remaining,
            limit,
            reset_at,
        }
    }

    /// 手动清除当前小时桶的计数
    pub async fn reset_limit(&self, client_id: &str) -> StoreResult<()> {
        let key = rate_limit_key(client_id, self.clock.now());
        self.store.delete(&[key]).await?;
        tracing::info!(client_id = %client_id, "Rate limit reset");
        Ok(())
    }
}

fn remaining(limit: u32, count: i64) -> u32 {
    (i64::from(limit) - count).clamp(0, i64::from(limit)) as u32
}

/// 当前小时桶剩余时长与结束时刻
fn bucket_end(now: DateTime<Utc>) -> (Duration, DateTime<Utc>) {
    let secs = now.timestamp();
    let end = (secs.div_euclid(BUCKET_SECS) + 1) * BUCKET_SECS;
    let reset_at = DateTime::<Utc>::from_timestamp(end, 0).unwrap_or(now);
    (Duration::from_secs((end - secs).max(1) as u64), reset_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryStore;
    use crate::infrastructure::ManualClock;
    use chrono::TimeZone;

    fn limiter(max: u32, start: DateTime<Utc>) -> (Arc<MemoryStore>, Arc<ManualClock>, RateLimiter) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start));
        let limiter = RateLimiter::with_clock(store.clone(), max, clock.clone());
        (store, clock, limiter)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, h, m, s).unwrap()
    }

    #[test]
    fn bucket_end_aligns_to_next_hour() {
        let (left, reset_at) = bucket_end(at(9, 45, 0));
        assert_eq!(left, Duration::from_secs(15 * 60));
        assert_eq!(reset_at, at(10, 0, 0));

        let (left, _) = bucket_end(at(10, 0, 0));
        assert_eq!(left, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn first_max_checks_pass_then_reject() {
        let (_, _, limiter) = limiter(5, at(9, 10, 0));

        for expected in (0..5).rev() {
            let decision = limiter.check_limit("client-a").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
        }

        let decision = limiter.check_limit("client-a").await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, at(10, 0, 0));
    }

    #[tokio::test]
    async fn rejected_checks_do_not_grow_the_counter() {
        let (store, _, limiter) = limiter(2, at(9, 10, 0));
        for _ in 0..10 {
            limiter.check_limit("client-a").await;
        }
        let key = rate_limit_key("client-a", at(9, 10, 0));
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn clients_are_counted_separately() {
        let (_, _, limiter) = limiter(1, at(9, 10, 0));
        assert!(limiter.check_limit("client-a").await.allowed);
        assert!(!limiter.check_limit("client-a").await.allowed);
        assert!(limiter.check_limit("client-b").await.allowed);
    }

    #[tokio::test]
    async fn next_hour_starts_a_new_window() {
        let (_, clock, limiter) = limiter(3, at(9, 59, 0));
        for _ in 0..3 {
            assert!(limiter.check_limit("client-a").await.allowed);
        }
        assert!(!limiter.check_limit("client-a").await.allowed);

        clock.set(at(10, 0, 1));
        let decision = limiter.check_limit("client-a").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn counter_expires_at_bucket_end() {
        let (store, _, limiter) = limiter(3, at(9, 59, 0));
        limiter.check_limit("client-a").await;

        let key = rate_limit_key("client-a", at(9, 59, 0));
        assert_eq!(store.ttl(&key).await.unwrap(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn unavailable_store_fails_open() {
        let (store, _, limiter) = limiter(1, at(9, 0, 0));
        limiter.check_limit("client-a").await;
        limiter.check_limit("client-a").await;
        store.set_available(false);

        for _ in 0..5 {
            let decision = limiter.check_limit("client-a").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 1);
        }
        assert_eq!(limiter.get_remaining("client-a").await.remaining, 1);
        assert!(limiter.reset_limit("client-a").await.is_err());
    }

    #[tokio::test]
    async fn get_remaining_does_not_count() {
        let (_, _, limiter) = limiter(10, at(9, 0, 0));
        limiter.check_limit("client-a").await;

        assert_eq!(limiter.get_remaining("client-a").await.remaining, 9);
        assert_eq!(limiter.get_remaining("client-a").await.remaining, 9);
        assert_eq!(limiter.get_remaining("client-b").await.remaining, 10);
    }

    #[tokio::test]
    async fn reset_clears_current_bucket() {
        let (_, _, limiter) = limiter(1, at(9, 0, 0));
        limiter.check_limit("client-a").await;
        assert!(!limiter.check_limit("client-a").await.allowed);

        limiter.reset_limit("client-a").await.unwrap();
        assert!(limiter.check_limit("client-a").await.allowed);
    }
}
