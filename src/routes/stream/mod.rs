mod handler;

pub use handler::{stream_top_clients, stream_usage};
