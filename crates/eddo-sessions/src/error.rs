use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error(transparent)]
    Store(#[from] eddo_store::StoreError),
}

impl From<SessionError> for eddo_core::CoreError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::NotFound(m) => eddo_core::CoreError::NotFound(m),
            SessionError::EntryNotFound(m) => eddo_core::CoreError::NotFound(m),
            SessionError::Store(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
