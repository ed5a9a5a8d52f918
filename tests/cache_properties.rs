use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::watch;
use usage_tracker::{
    cache::{
        BackingStore, CacheOperations, EventBus, MemoryStore, RateLimiter,
        keys::{LOGS_UPDATES_CHANNEL, USAGE_DAILY_PATTERN, USAGE_TOP_KEY, usage_daily_key},
    },
    live::{SessionConfig, open_live_session},
};

const TTL: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn concurrent_pattern_invalidation_leaves_no_matching_keys() {
    let store = Arc::new(MemoryStore::new());
    let cache = CacheOperations::new(store.clone());
    for days in 1..=50 {
        cache.set(&usage_daily_key(days), &days, TTL).await;
    }
    cache.set(USAGE_TOP_KEY, &"kept", TTL).await;

    let first = tokio::spawn({
        let cache = cache.clone();
        async move { cache.invalidate_pattern(USAGE_DAILY_PATTERN).await }
    });
    let second = tokio::spawn({
        let cache = cache.clone();
        async move { cache.invalidate_pattern(USAGE_DAILY_PATTERN).await }
    });
    let removed = first.await.unwrap() + second.await.unwrap();

    assert_eq!(removed, 50);
    assert!(store.scan(USAGE_DAILY_PATTERN).await.unwrap().is_empty());
    assert_eq!(cache.get::<String>(USAGE_TOP_KEY).await.as_deref(), Some("kept"));
}

#[tokio::test]
async fn unavailable_store_degrades_every_component() {
    let store = Arc::new(MemoryStore::new());
    let cache = CacheOperations::new(store.clone());
    let limiter = RateLimiter::new(store.clone(), 1);
    cache.set(USAGE_TOP_KEY, &1u32, TTL).await;
    limiter.check_limit("client-a").await;
    store.set_available(false);

    for _ in 0..3 {
        assert!(limiter.check_limit("client-a").await.allowed);
    }

    let calls = AtomicUsize::new(0);
    for _ in 0..3 {
        let counter = &calls;
        let lookup = cache
            .get_or_compute(USAGE_TOP_KEY, TTL, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(2u32)
            })
            .await
            .unwrap();
        assert!(!lookup.from_cache);
        assert_eq!(lookup.value, 2);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn session_survives_a_malformed_payload() {
    let store = Arc::new(MemoryStore::new());
    let bus = EventBus::new(store.clone());
    let (_stop, shutdown) = watch::channel(false);

    let mut frames = open_live_session(&bus, LOGS_UPDATES_CHANNEL, SessionConfig::default(), shutdown)
        .await
        .unwrap();
    assert_eq!(frames.next().await.unwrap().event, "connected");

    store
        .publish(LOGS_UPDATES_CHANNEL, "not json at all")
        .await
        .unwrap();
    bus.publish(LOGS_UPDATES_CHANNEL, "log_recorded", &json!({"endpoint": "/v1/orders"}))
        .await
        .unwrap();

    let frame = frames.next().await.unwrap();
    assert_eq!(frame.event, "log_recorded");
    assert_eq!(frame.data["data"]["endpoint"], "/v1/orders");
    assert_eq!(
        frame.encode().lines().next(),
        Some("event: log_recorded")
    );
}
