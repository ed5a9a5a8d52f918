mod handler;
mod model;

pub use handler::record_log;
pub use model::{RecordLogRequest, RecordLogResponse};
