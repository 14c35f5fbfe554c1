use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit entry already exists: {0}")]
    Conflict(String),

    #[error("invalid query: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] eddo_store::StoreError),
}

impl From<AuditError> for eddo_core::CoreError {
    fn from(value: AuditError) -> Self {
        match value {
            AuditError::Conflict(m) => eddo_core::CoreError::Conflict(m),
            AuditError::Validation(m) => eddo_core::CoreError::Validation(m),
            AuditError::Store(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
