use thiserror::Error;

#[derive(Debug, Error)]
pub enum TodoError {
    #[error("todo not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("no active time-tracking session")]
    NoActiveSession,

    #[error(transparent)]
    Store(#[from] eddo_store::StoreError),
}

impl From<TodoError> for eddo_core::CoreError {
    fn from(value: TodoError) -> Self {
        match value {
            TodoError::NotFound(m) => eddo_core::CoreError::NotFound(m),
            TodoError::Validation(m) => eddo_core::CoreError::Validation(m),
            TodoError::NoActiveSession => eddo_core::CoreError::Validation("no active time-tracking session".to_string()),
            TodoError::Store(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TodoError>;
