/// 后端存储适配层
/// 封装键值/发布订阅服务，所有组件通过 `Arc<dyn BackingStore>` 注入使用
mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisTimeouts};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// 连接失败、超时或探活失败
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    /// 存储端返回了错误
    #[error("backing store command failed: {0}")]
    Command(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 有上限的原子自增结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Increment {
    /// 已计数，携带自增后的值
    Counted(i64),
    /// 已达上限，未自增，携带当前值
    Saturated(i64),
}

/// 订阅得到的原始消息流，直到取消订阅或连接断开才结束
pub type PayloadStream = BoxStream<'static, String>;

#[async_trait]
pub trait BackingStore: Send + Sync {
    /// 探活
    async fn ping(&self) -> bool;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// 返回实际删除的键数量
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    /// 基于游标的模式扫描
    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>>;

    async fn incr(&self, key: &str) -> StoreResult<i64>;

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// 剩余存活时间；键不存在或没有过期时间时返回 None
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// 单次原子操作：当前值已达 `limit` 时拒绝；否则自增，
    /// 首次计数（或计数器缺少过期时间）时设置 `ttl`
    async fn incr_bounded(&self, key: &str, limit: i64, ttl: Duration) -> StoreResult<Increment>;

    /// 返回收到消息的订阅者数量，零个订阅者不是错误
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<u64>;

    async fn subscribe(&self, channel: &str) -> StoreResult<PayloadStream>;

    /// 释放连接；之后的调用会重新建立连接
    async fn close(&self);
}

/// Redis 风格的 glob 匹配，支持 `*`、`?` 和 `\` 转义
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
                continue;
            }
            Some('?') => {
                pi += 1;
                ti += 1;
                continue;
            }
            Some('\\') if pi + 1 < p.len() && p[pi + 1] == t[ti] => {
                pi += 2;
                ti += 1;
                continue;
            }
            Some(c) if *c != '\\' && *c == t[ti] => {
                pi += 1;
                ti += 1;
                continue;
            }
            _ => {}
        }
        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

/// 是否包含 glob 元字符
pub fn is_pattern(key: &str) -> bool {
    key.contains(['*', '?', '['])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_prefix_patterns() {
        assert!(glob_match("usage:daily:*", "usage:daily:7days"));
        assert!(glob_match("usage:daily:*", "usage:daily:"));
        assert!(!glob_match("usage:daily:*", "usage:top:24h"));
        assert!(!glob_match("usage:daily:*", "usage:daily"));
    }

    #[test]
    fn glob_handles_inner_wildcards() {
        assert!(glob_match("usage:client:*:7days", "usage:client:abc:7days"));
        assert!(!glob_match("usage:client:*:7days", "usage:client:abc:30days"));
        assert!(glob_match("rate_limit:?", "rate_limit:a"));
        assert!(!glob_match("rate_limit:?", "rate_limit:ab"));
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "axb"));
    }

    #[test]
    fn detects_patterns() {
        assert!(is_pattern("usage:daily:*"));
        assert!(!is_pattern("usage:top:24h"));
    }
}
