use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Users(#[from] eddo_users::UserError),
}

impl From<AuthError> for eddo_core::CoreError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::Unauthorized(m) => eddo_core::CoreError::Unauthorized(m),
            AuthError::Users(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
