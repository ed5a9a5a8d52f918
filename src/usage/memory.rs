use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ApiLog, DailyUsage, NewApiLog, SourceError, SourceResult, TopClient, UsageSource};
use crate::infrastructure::{Clock, SystemClock};

/// 日志保留天数，覆盖所有查询窗口中最长的一个
pub const RETENTION_DAYS: i64 = 7;

#[derive(Default)]
struct Ledger {
    /// 按写入时间排序
    logs: VecDeque<ApiLog>,
    /// 出现过的客户端，不随日志淘汰
    clients: HashSet<Uuid>,
}

/// 进程内的用量数据源，只保留最近 [`RETENTION_DAYS`] 天的日志
pub struct MemoryUsageSource {
    ledger: RwLock<Ledger>,
    clock: Arc<dyn Clock>,
    failing: AtomicBool,
}

impl Default for MemoryUsageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUsageSource {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: RwLock::new(Ledger::default()),
            clock,
            failing: AtomicBool::new(false),
        }
    }

    /// 模拟数据库故障，之后所有查询返回 `Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> SourceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("database connection refused".into()));
        }
        Ok(())
    }

    /// 当前保留的日志条数
    pub async fn retained(&self) -> usize {
        self.ledger.read().await.logs.len()
    }

    async fn daily(&self, days: u32, client: Option<Uuid>) -> SourceResult<Vec<DailyUsage>> {
        self.check()?;
        let since = self.clock.now() - chrono::Duration::days(i64::from(days));
        let ledger = self.ledger.read().await;

        let mut counts: HashMap<(Uuid, String), u64> = HashMap::new();
        for log in ledger.logs.iter().filter(|log| log.timestamp >= since) {
            if client.is_some_and(|id| id != log.client_id) {
                continue;
            }
            let date = log.timestamp.format("%Y-%m-%d").to_string();
            *counts.entry((log.client_id, date)).or_default() += 1;
        }

        let mut usage: Vec<DailyUsage> = counts
            .into_iter()
            .map(|((client_id, date), count)| DailyUsage {
                client_id,
                date,
                count,
            })
            .collect();
        usage.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then(b.count.cmp(&a.count))
                .then(a.client_id.cmp(&b.client_id))
        });
        Ok(usage)
    }
}

#[async_trait]
impl UsageSource for MemoryUsageSource {
    async fn record(&self, log: NewApiLog) -> SourceResult<ApiLog> {
        self.check()?;
        let log = ApiLog {
            id: Uuid::new_v4(),
            client_id: log.client_id,
            ip: log.ip,
            endpoint: log.endpoint,
            timestamp: self.clock.now(),
        };
        let cutoff = log.timestamp - chrono::Duration::days(RETENTION_DAYS);
        let mut ledger = self.ledger.write().await;
        while ledger.logs.front().is_some_and(|oldest| oldest.timestamp < cutoff) {
            ledger.logs.pop_front();
        }
        ledger.clients.insert(log.client_id);
        ledger.logs.push_back(log.clone());
        Ok(log)
    }

    async fn daily_usage(&self, days: u32) -> SourceResult<Vec<DailyUsage>> {
        self.daily(days, None).await
    }

    async fn daily_usage_by_client(&self, client_id: Uuid, days: u32) -> SourceResult<Vec<DailyUsage>> {
        self.daily(days, Some(client_id)).await
    }

    async fn top_clients(&self, limit: usize, window: Duration) -> SourceResult<Vec<TopClient>> {
        self.check()?;
        let window =
            chrono::Duration::from_std(window).map_err(|e| SourceError::Query(e.to_string()))?;
        let since = self.clock.now() - window;
        let ledger = self.ledger.read().await;

        let mut totals: BTreeMap<Uuid, u64> = BTreeMap::new();
        for log in ledger.logs.iter().filter(|log| log.timestamp >= since) {
            *totals.entry(log.client_id).or_default() += 1;
        }

        let mut top: Vec<TopClient> = totals
            .into_iter()
            .map(|(client_id, total_requests)| TopClient {
                client_id,
                total_requests,
            })
            .collect();
        // 稳定排序，次数相同时保持客户端 ID 升序
        top.sort_by(|a, b| b.total_requests.cmp(&a.total_requests));
        top.truncate(limit);
        Ok(top)
    }

    async fn total_requests(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> SourceResult<u64> {
        self.check()?;
        let ledger = self.ledger.read().await;
        Ok(ledger
            .logs
            .iter()
            .filter(|log| log.timestamp >= from && log.timestamp < to)
            .count() as u64)
    }

    async fn client_count(&self) -> SourceResult<u64> {
        self.check()?;
        Ok(self.ledger.read().await.clients.len() as u64)
    }

    async fn has_client(&self, client_id: Uuid) -> SourceResult<bool> {
        self.check()?;
        Ok(self.ledger.read().await.clients.contains(&client_id))
    }
}
