use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub redis_connect_timeout_ms: u64,
    pub redis_command_timeout_ms: u64,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub rate_limit_per_hour: u32,
    pub cache_ttl_secs: u64,
    pub stats_cache_ttl_secs: u64,
    /// 剩余存活时间低于 TTL 的这个比例时触发预取
    pub prefetch_threshold: f64,
    pub heartbeat_interval_secs: u64,
    pub top_clients_poll_secs: u64,
    pub background_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/".into(),
            redis_connect_timeout_ms: 5000,
            redis_command_timeout_ms: 3000,
            server_host: "0.0.0.0".into(),
            server_port: 8080,
            api_base_uri: "/api".into(),
            rate_limit_per_hour: 1000,
            cache_ttl_secs: 3600,
            stats_cache_ttl_secs: 300,
            prefetch_threshold: 300.0 / 3600.0,
            heartbeat_interval_secs: 30,
            top_clients_poll_secs: 60,
            background_workers: 32,
        }
    }
}

impl Config {
    /// 读取 `.env` 与环境变量，缺失或无法解析的值使用默认值
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str, default| parse_or(lookup(name), name, default);

        Config {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            redis_connect_timeout_ms: parsed("REDIS_CONNECT_TIMEOUT_MS", defaults.redis_connect_timeout_ms),
            redis_command_timeout_ms: parsed("REDIS_COMMAND_TIMEOUT_MS", defaults.redis_command_timeout_ms),
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or(lookup("SERVER_PORT"), "SERVER_PORT", defaults.server_port),
            api_base_uri: lookup("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            rate_limit_per_hour: parse_or(
                lookup("RATE_LIMIT_PER_HOUR"),
                "RATE_LIMIT_PER_HOUR",
                defaults.rate_limit_per_hour,
            ),
            cache_ttl_secs: parsed("CACHE_TTL_SECS", defaults.cache_ttl_secs),
            stats_cache_ttl_secs: parsed("STATS_CACHE_TTL_SECS", defaults.stats_cache_ttl_secs),
            prefetch_threshold: fraction_or(
                lookup("PREFETCH_THRESHOLD"),
                "PREFETCH_THRESHOLD",
                defaults.prefetch_threshold,
            ),
            heartbeat_interval_secs: parsed("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval_secs),
            top_clients_poll_secs: parsed("TOP_CLIENTS_POLL_SECS", defaults.top_clients_poll_secs),
            background_workers: parse_or(
                lookup("BACKGROUND_WORKERS"),
                "BACKGROUND_WORKERS",
                defaults.background_workers,
            ),
        }
    }

    pub fn redis_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_connect_timeout_ms)
    }

    pub fn redis_command_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_command_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn stats_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_cache_ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn top_clients_poll(&self) -> Duration {
        Duration::from_secs(self.top_clients_poll_secs.max(1))
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "Invalid configuration value, using default");
            default
        }),
        None => default,
    }
}

/// 0 到 1 之间的比例，NaN 和无穷大按无效值处理
fn fraction_or(raw: Option<String>, name: &str, default: f64) -> f64 {
    let value = parse_or(raw, name, default);
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        tracing::warn!(variable = name, value, "Non-finite configuration value, using default");
        default
    }
}
