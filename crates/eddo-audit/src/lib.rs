pub mod error;
pub mod store;
pub mod types;

pub use error::{AuditError, Result};
pub use store::AuditStore;
pub use types::{AuditAction, AuditEntry, AuditSource, ListBySourceOptions, ListOptions, ListResult};
