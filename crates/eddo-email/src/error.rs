use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("imap error: {0}")]
    Imap(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("oauth token refresh failed: {0}")]
    OAuthRefresh(String),

    #[error("invalid connection config: {0}")]
    Config(String),
}

impl From<EmailError> for eddo_core::CoreError {
    fn from(value: EmailError) -> Self {
        match value {
            EmailError::Config(m) => eddo_core::CoreError::Validation(m),
            other => eddo_core::CoreError::Network(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EmailError>;
