// 缓存模块
// 包含后端存储适配、缓存键、数据结构和操作逻辑

pub mod keys;
pub mod models;
pub mod operations;
pub mod store;

// 重新导出常用类型，方便其他模块使用
pub use models::{EventEnvelope, RateDecision};
pub use operations::{
    CacheOperations, EventBus, EventStream, Inbound, Lookup, PrefetchRefresher, RateLimiter,
};
pub use store::{BackingStore, MemoryStore, RedisStore, RedisTimeouts, StoreError, StoreResult};
