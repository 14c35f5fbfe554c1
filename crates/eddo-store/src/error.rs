use thiserror::Error;

/// Error kinds the document-store adapter classifies and surfaces, never
/// leaking a `couch_rs` type across the crate boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP 404 — the only retry-able absence signal; callers interpret
    /// this as "missing", not as a failure.
    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP 409 — concurrent write detected. Recovered locally only for
    /// design-document installation (≤10 tries, linear backoff); data
    /// writes surface this to the caller.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn from_couch(err: couch_rs::error::CouchError) -> Self {
        match err.status {
            couch_rs::error::StatusCode::NOT_FOUND => StoreError::NotFound(err.message),
            couch_rs::error::StatusCode::CONFLICT => StoreError::Conflict(err.message),
            couch_rs::error::StatusCode::UNAUTHORIZED | couch_rs::error::StatusCode::FORBIDDEN => {
                StoreError::Unauthorized(err.message)
            }
            status if status.is_server_error() => StoreError::Network(err.message),
            _ => StoreError::Other(err.message),
        }
    }
}

impl From<eddo_core::CoreError> for StoreError {
    fn from(value: eddo_core::CoreError) -> Self {
        StoreError::Other(value.to_string())
    }
}

impl From<StoreError> for eddo_core::CoreError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(m) => eddo_core::CoreError::NotFound(m),
            StoreError::Conflict(m) => eddo_core::CoreError::Conflict(m),
            StoreError::Unauthorized(m) => eddo_core::CoreError::Unauthorized(m),
            StoreError::Network(m) => eddo_core::CoreError::Network(m),
            StoreError::InvalidQuery(m) => eddo_core::CoreError::Validation(m),
            StoreError::Other(m) => eddo_core::CoreError::Database(m),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
