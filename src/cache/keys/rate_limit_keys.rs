use chrono::{DateTime, Utc};

/// 速率限制计数器键前缀
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// 小时桶格式
const HOUR_BUCKET_FORMAT: &str = "%Y-%m-%d-%H";

/// 格式化到小时的时间桶
pub fn hour_bucket(now: DateTime<Utc>) -> String {
    now.format(HOUR_BUCKET_FORMAT).to_string()
}

/// 生成某个客户端在当前小时桶内的计数器键
pub fn rate_limit_key(client_id: &str, now: DateTime<Utc>) -> String {
    format!("{}{}:{}", RATE_LIMIT_PREFIX, client_id, hour_bucket(now))
}
