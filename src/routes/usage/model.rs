use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::Lookup;

pub const DAILY_WINDOW_DAYS: u32 = 7;
pub const TOP_CLIENTS_LIMIT: usize = 3;
pub const TOP_CLIENTS_WINDOW: Duration = Duration::from_secs(24 * 3600);

/// 聚合查询的响应，`cached` 表示是否来自缓存
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedResponse<T> {
    pub data: T,
    pub cached: bool,
}

impl<T> From<Lookup<T>> for CachedResponse<T> {
    fn from(lookup: Lookup<T>) -> Self {
        Self {
            data: lookup.value,
            cached: lookup.from_cache,
        }
    }
}
