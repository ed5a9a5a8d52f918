mod handler;

pub use handler::{RateLimitStatus, get_rate_limit, reset_rate_limit};
