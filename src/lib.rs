use std::sync::Arc;

use cache::{BackingStore, CacheOperations, EventBus, PrefetchRefresher, RateLimiter};
use config::Config;
use infrastructure::BackgroundTasks;
use tokio::sync::watch;
use usage::UsageSource;

pub mod cache;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod live;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod usage;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn BackingStore>,
    pub cache: CacheOperations,
    pub limiter: RateLimiter,
    pub bus: EventBus,
    pub prefetch: PrefetchRefresher,
    pub tasks: BackgroundTasks,
    pub usage: Arc<dyn UsageSource>,
    /// 置为 true 时所有实时会话结束
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn BackingStore>,
        usage: Arc<dyn UsageSource>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let cache = CacheOperations::new(store.clone());
        let tasks = BackgroundTasks::new(config.background_workers);
        Self {
            limiter: RateLimiter::new(store.clone(), config.rate_limit_per_hour),
            bus: EventBus::new(store.clone()),
            prefetch: PrefetchRefresher::new(cache.clone(), tasks.clone()),
            cache,
            tasks,
            store,
            usage,
            config,
            shutdown,
        }
    }
}
