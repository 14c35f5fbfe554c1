use thiserror::Error;

/// Error kinds surfaced by the server core, shared across every crate that
/// talks to the document store or the tool server.
///
/// Variants map 1:1 onto the `error_type` values the tool server emits in its
/// failure envelope (see `eddo_tools::envelope`).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Short, stable classification used in the tool envelope's `error_type`.
    pub fn error_type(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::Conflict(_) => "database_error",
            CoreError::Unauthorized(_) => "auth_error",
            CoreError::Validation(_) => "validation_error",
            CoreError::Network(_) => "database_error",
            CoreError::Database(_) => "database_error",
            CoreError::Config(_) => "database_error",
            CoreError::Other(_) => "database_error",
        }
    }

    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, CoreError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
