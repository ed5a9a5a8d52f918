pub mod background;
pub mod clock;

pub use background::{BackgroundTasks, TaskError};
pub use clock::{Clock, ManualClock, SystemClock};
