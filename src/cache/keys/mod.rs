/// 缓存键模块
/// 提供各种缓存键、模式和频道名

// 用量缓存键模块
pub mod usage_keys;

// 速率限制键模块
pub mod rate_limit_keys;

// 发布订阅频道
pub mod channels;

// 重新导出常用的键生成函数
pub use channels::LOGS_UPDATES_CHANNEL;
pub use rate_limit_keys::{hour_bucket, rate_limit_key};
pub use usage_keys::{
    USAGE_DAILY_PATTERN, USAGE_STATS_KEY, USAGE_TOP_KEY, usage_client_key, usage_client_pattern,
    usage_daily_key,
};
