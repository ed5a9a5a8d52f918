use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一次速率限制检查的结果
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateDecision {
    /// 存储不可用时放行
    pub fn fail_open(limit: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining: limit,
            limit,
            reset_at,
        }
    }
}
