use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user already exists: {0}")]
    AlreadyExists(String),

    #[error("user not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] eddo_store::StoreError),
}

impl From<UserError> for eddo_core::CoreError {
    fn from(value: UserError) -> Self {
        match value {
            UserError::AlreadyExists(m) => eddo_core::CoreError::Conflict(m),
            UserError::NotFound(m) => eddo_core::CoreError::NotFound(m),
            UserError::Store(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UserError>;
