/// 每日用量缓存键前缀
const USAGE_DAILY_PREFIX: &str = "usage:daily:";

/// 单个客户端用量缓存键前缀
const USAGE_CLIENT_PREFIX: &str = "usage:client:";

/// 最近 24 小时请求量最高的客户端
pub const USAGE_TOP_KEY: &str = "usage:top:24h";

/// 总体统计
pub const USAGE_STATS_KEY: &str = "usage:stats:overall";

/// 所有每日用量缓存
pub const USAGE_DAILY_PATTERN: &str = "usage:daily:*";

/// 生成每日用量缓存键
pub fn usage_daily_key(days: u32) -> String {
    format!("{}{}days", USAGE_DAILY_PREFIX, days)
}

/// 生成单个客户端用量缓存键
pub fn usage_client_key(client_id: &str, days: u32) -> String {
    format!("{}{}:{}days", USAGE_CLIENT_PREFIX, client_id, days)
}

/// 单个客户端的所有用量缓存
pub fn usage_client_pattern(client_id: &str) -> String {
    format!("{}{}:*", USAGE_CLIENT_PREFIX, client_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::glob_match;

    #[test]
    fn daily_keys_fall_under_daily_pattern() {
        assert_eq!(usage_daily_key(7), "usage:daily:7days");
        assert!(glob_match(USAGE_DAILY_PATTERN, &usage_daily_key(7)));
        assert!(!glob_match(USAGE_DAILY_PATTERN, USAGE_TOP_KEY));
    }

    #[test]
    fn client_pattern_is_scoped_to_one_client() {
        let key = usage_client_key("a1", 7);
        assert_eq!(key, "usage:client:a1:7days");
        assert!(glob_match(&usage_client_pattern("a1"), &key));
        assert!(!glob_match(&usage_client_pattern("b2"), &key));
    }
}
