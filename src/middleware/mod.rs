mod error_handler;
mod rate_limit;

pub use error_handler::log_errors;
pub use rate_limit::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET, rate_limit_headers};
