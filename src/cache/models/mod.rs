/// 缓存数据模型
/// 定义缓存与事件总线上的数据结构
pub mod event;
pub mod rate_limit;

// 重新导出常用类型
pub use event::EventEnvelope;
pub use rate_limit::RateDecision;
