pub mod engine;
pub mod error;
pub mod sync;
pub mod types;

pub use engine::SyncScheduler;
pub use error::{Result, SchedulerError};
pub use types::{SyncStats, UserSyncResult};
