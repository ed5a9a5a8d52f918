// 用量数据源
// 关系库的实现不在本仓库内，缓存层只通过 `UsageSource` 调用它

mod memory;
mod model;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryUsageSource;
pub use model::{ApiLog, DailyUsage, NewApiLog, TopClient, UsageStats};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("usage source unavailable: {0}")]
    Unavailable(String),
    #[error("usage query failed: {0}")]
    Query(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn record(&self, log: NewApiLog) -> SourceResult<ApiLog>;

    /// 最近 `days` 天按客户端、按天汇总，日期倒序、同日按次数倒序
    async fn daily_usage(&self, days: u32) -> SourceResult<Vec<DailyUsage>>;

    async fn daily_usage_by_client(&self, client_id: Uuid, days: u32) -> SourceResult<Vec<DailyUsage>>;

    /// 窗口内调用次数最多的前 `limit` 个客户端
    async fn top_clients(&self, limit: usize, window: Duration) -> SourceResult<Vec<TopClient>>;

    /// `[from, to)` 内的调用总数
    async fn total_requests(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> SourceResult<u64>;

    async fn client_count(&self) -> SourceResult<u64>;

    async fn has_client(&self, client_id: Uuid) -> SourceResult<bool>;
}

/// 汇总最近 24 小时、7 天的调用数和客户端总数
pub async fn overall_stats(source: &dyn UsageSource, now: DateTime<Utc>) -> SourceResult<UsageStats> {
    let total_requests_24h = source
        .total_requests(now - chrono::Duration::hours(24), now)
        .await?;
    let total_requests_7d = source
        .total_requests(now - chrono::Duration::days(7), now)
        .await?;
    let total_clients = source.client_count().await?;

    Ok(UsageStats {
        total_requests_24h,
        total_requests_7d,
        total_clients,
        timestamp: now,
    })
}
