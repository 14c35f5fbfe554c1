use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SOURCE_FOLDER: &str = eddo_core::config::DEFAULT_EMAIL_FOLDER;
pub const PROCESSED_FOLDER: &str = "eddo-processed";
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailProvider {
    Gmail,
    Plain,
}

/// The connection parameters for one user's mailbox (§4.I). `imap_user`
/// falls back to `oauth_email` when absent, per §4.J step 1.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub provider: EmailProvider,
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_user: String,
    pub imap_password: Option<String>,
    pub folder: String,
}

impl ConnectionConfig {
    pub fn from_preferences(
        email_config: &eddo_users::EmailConfig,
        folder: &str,
        access_token: Option<&str>,
    ) -> super::error::Result<(Self, Option<String>)> {
        let imap_user = email_config
            .imap_user
            .clone()
            .or_else(|| email_config.oauth_email.clone())
            .ok_or_else(|| super::error::EmailError::Config("neither imapUser nor oauthEmail set".to_string()))?;

        let password = match email_config.provider {
            eddo_users::EmailProvider::Gmail => None,
            eddo_users::EmailProvider::Plain => Some(
                email_config
                    .imap_password
                    .clone()
                    .ok_or_else(|| super::error::EmailError::Config("imapPassword required for plain auth".to_string()))?,
            ),
        };

        Ok((
            Self {
                provider: match email_config.provider {
                    eddo_users::EmailProvider::Gmail => EmailProvider::Gmail,
                    eddo_users::EmailProvider::Plain => EmailProvider::Plain,
                },
                imap_host: email_config.imap_host.clone(),
                imap_port: email_config.imap_port,
                imap_user,
                imap_password: password,
                folder: folder.to_string(),
            },
            access_token.map(str::to_string),
        ))
    }
}

/// One fetched, decoded message (§4.I).
#[derive(Debug, Clone)]
pub struct IngestionItem {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub from_name: Option<String>,
    pub received_date: DateTime<Utc>,
    pub message_id: String,
    pub uid: u32,
    pub folder: String,
    pub gmail_message_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MoveResult {
    pub moved: Vec<u32>,
    pub failed: Vec<u32>,
}
