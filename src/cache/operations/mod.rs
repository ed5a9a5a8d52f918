/// 缓存操作
/// 缓存读写、限流、事件总线与预取刷新

// 通用缓存读写
pub mod cache;

// 每小时固定窗口限流
pub mod rate_limit;

// 发布订阅
pub mod event_bus;

// 预取刷新
pub mod prefetch;

// 重新导出常用操作
pub use cache::{CacheOperations, Lookup};
pub use event_bus::{EventBus, EventStream, Inbound};
pub use prefetch::PrefetchRefresher;
pub use rate_limit::RateLimiter;
