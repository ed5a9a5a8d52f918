use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 一次 API 调用记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiLog {
    pub id: Uuid,
    pub client_id: Uuid,
    pub ip: String,
    pub endpoint: String,
    pub timestamp: DateTime<Utc>,
}

/// 待写入的调用记录，`id` 与 `timestamp` 由数据源生成
#[derive(Debug, Clone)]
pub struct NewApiLog {
    pub client_id: Uuid,
    pub ip: String,
    pub endpoint: String,
}

/// 某客户端某一天的调用次数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub client_id: Uuid,
    /// YYYY-MM-DD
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopClient {
    pub client_id: Uuid,
    pub total_requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests_24h: u64,
    pub total_requests_7d: u64,
    pub total_clients: u64,
    pub timestamp: DateTime<Utc>,
}
