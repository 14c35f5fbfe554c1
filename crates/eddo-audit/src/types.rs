use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Complete,
    Uncomplete,
    TimeTrackingStart,
    TimeTrackingStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditSource {
    Web,
    Mcp,
    Telegram,
    #[serde(rename = "github-sync")]
    GithubSync,
    #[serde(rename = "rss-sync")]
    RssSync,
    #[serde(rename = "email-sync")]
    EmailSync,
}

impl AuditSource {
    /// The fixed enumeration `listBySource` fans out over, in the order
    /// the scenario in §8 enumerates them.
    pub const ALL: [AuditSource; 6] = [
        AuditSource::Web,
        AuditSource::Mcp,
        AuditSource::Telegram,
        AuditSource::GithubSync,
        AuditSource::RssSync,
        AuditSource::EmailSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSource::Web => "web",
            AuditSource::Mcp => "mcp",
            AuditSource::Telegram => "telegram",
            AuditSource::GithubSync => "github-sync",
            AuditSource::RssSync => "rss-sync",
            AuditSource::EmailSync => "email-sync",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Equals `timestamp`; append-only, never reused.
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub source: AuditSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
    pub version: String,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        entity_id: impl Into<String>,
        source: AuditSource,
        before: Option<Value>,
        after: Option<Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            rev: None,
            timestamp: now,
            action,
            entity_type: "todo".to_string(),
            entity_id: entity_id.into(),
            source,
            before,
            after,
            message: None,
            metadata: None,
            version: "audit_alpha1".to_string(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub start_after: Option<String>,
    pub entity_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub entries: Vec<AuditEntry>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListBySourceOptions {
    pub limit_per_source: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_equals_timestamp() {
        let entry = AuditEntry::new(AuditAction::Create, "T1", AuditSource::Mcp, None, None);
        assert_eq!(entry.id, entry.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
    }
}
