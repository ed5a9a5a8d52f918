mod handler;
mod model;

pub use handler::{client_usage, daily_usage, top_clients, usage_stats};
pub use model::{CachedResponse, DAILY_WINDOW_DAYS, TOP_CLIENTS_LIMIT, TOP_CLIENTS_WINDOW};
