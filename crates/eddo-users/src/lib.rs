pub mod error;
pub mod registry;
pub mod types;

pub use error::{Result, UserError};
pub use registry::UserRegistry;
pub use types::{EmailConfig, EmailProvider, NewUser, Permission, UserEntry, UserPatch, UserPreferences, UserStatus};
