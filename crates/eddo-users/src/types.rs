use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_user: Option<String>,
    pub imap_password: Option<String>,
    pub oauth_email: Option<String>,
    pub oauth_refresh_token: Option<String>,
    pub provider: EmailProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailProvider {
    Gmail,
    Plain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default)]
    pub email_sync: bool,
    pub email_config: Option<EmailConfig>,
    #[serde(default = "default_email_folder")]
    pub email_folder: String,
    #[serde(default = "default_sync_interval")]
    pub email_sync_interval: i64,
    #[serde(default = "default_sync_tags")]
    pub email_sync_tags: Vec<String>,
    pub email_last_sync: Option<DateTime<Utc>>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            email_sync: false,
            email_config: None,
            email_folder: default_email_folder(),
            email_sync_interval: default_sync_interval(),
            email_sync_tags: default_sync_tags(),
            email_last_sync: None,
        }
    }
}

fn default_email_folder() -> String {
    eddo_core::config::DEFAULT_EMAIL_FOLDER.to_string()
}
fn default_sync_interval() -> i64 {
    eddo_core::config::DEFAULT_SYNC_INTERVAL_MINUTES
}
fn default_sync_tags() -> Vec<String> {
    vec!["source:email".to_string(), "gtd:next".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub username: String,
    pub telegram_id: Option<i64>,
    pub email: Option<String>,
    pub database_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub permissions: Vec<Permission>,
    pub status: UserStatus,
    pub preferences: UserPreferences,
    pub version: String,
}

impl UserEntry {
    pub fn is_eligible_for_sync(&self, now: DateTime<Utc>) -> bool {
        if self.status != UserStatus::Active {
            return false;
        }
        if !self.preferences.email_sync || self.preferences.email_config.is_none() {
            return false;
        }
        let interval = chrono::Duration::minutes(self.preferences.email_sync_interval);
        match self.preferences.email_last_sync {
            None => true,
            Some(last) => now - last >= interval,
        }
    }
}

/// A request to create a new registry entry; callers never set `_id`,
/// `database_name`, `version`, `status`, or `permissions` directly.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub telegram_id: Option<i64>,
    pub email: Option<String>,
}

/// A partial update applied read-modify-write. `None` leaves a field
/// untouched; this mirrors the todo store's "absent patch fields preserved"
/// rule (§4.H `updateTodo`) applied to the registry.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<Option<String>>,
    pub status: Option<UserStatus>,
    pub permissions: Option<Vec<Permission>>,
    pub preferences: Option<UserPreferences>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligible_when_never_synced() {
        let mut entry = sample();
        entry.preferences.email_sync = true;
        entry.preferences.email_config = Some(sample_email_config());
        entry.preferences.email_last_sync = None;
        assert!(entry.is_eligible_for_sync(Utc::now()));
    }

    #[test]
    fn not_eligible_before_interval_elapses() {
        let mut entry = sample();
        entry.preferences.email_sync = true;
        entry.preferences.email_config = Some(sample_email_config());
        entry.preferences.email_last_sync = Some(Utc::now());
        assert!(!entry.is_eligible_for_sync(Utc::now()));
    }

    fn sample() -> UserEntry {
        UserEntry {
            id: "user_alice".into(),
            rev: None,
            username: "alice".into(),
            telegram_id: None,
            email: None,
            database_name: "eddo_user_alice".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            permissions: vec![Permission::Read, Permission::Write],
            status: UserStatus::Active,
            preferences: UserPreferences::default(),
            version: "alpha2".into(),
        }
    }

    fn sample_email_config() -> EmailConfig {
        EmailConfig {
            imap_host: "imap.example.com".into(),
            imap_port: 993,
            imap_user: Some("alice@example.com".into()),
            imap_password: Some("secret".into()),
            oauth_email: None,
            oauth_refresh_token: None,
            provider: EmailProvider::Plain,
        }
    }
}
