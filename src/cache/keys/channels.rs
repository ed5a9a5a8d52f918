/// 新日志写入后的实时通知频道
pub const LOGS_UPDATES_CHANNEL: &str = "api_logs:updates";
