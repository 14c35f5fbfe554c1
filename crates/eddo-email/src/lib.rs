pub mod client;
pub mod decode;
pub mod error;
pub mod mapping;
pub mod oauth;
pub mod types;

pub use client::{fetch_emails, mark_as_read, move_to_processed};
pub use error::{EmailError, Result};
pub use mapping::{generate_external_id, map_email_to_todo};
pub use oauth::refresh_access_token;
pub use types::{ConnectionConfig, EmailProvider, IngestionItem, MoveResult, DEFAULT_SOURCE_FOLDER, PROCESSED_FOLDER};
