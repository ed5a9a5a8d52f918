pub mod health;
pub mod logs;
pub mod rate_limit;
pub mod stream;
pub mod usage;
