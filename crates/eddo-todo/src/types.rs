use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A metadata value: a plain string or an ordered sequence of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Single(String),
    List(Vec<String>),
}

/// The canonical (alpha3) todo document, §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    pub due: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
    /// Start-timestamp (as an RFC3339 string key) -> end-timestamp, or
    /// `None` for a running timer. At most one entry may be `None` at a
    /// time (§4.E).
    #[serde(default)]
    pub active: HashMap<String, Option<DateTime<Utc>>>,
    #[serde(default)]
    pub repeat: Option<i64>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(rename = "externalId", default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,
    pub version: String,
}

impl Todo {
    /// `gtd:calendar` is the tag that switches the repeat-policy anchor
    /// from completion time to the original due date (§4.E).
    pub fn has_calendar_tag(&self) -> bool {
        self.tags.iter().any(|t| t == "gtd:calendar")
    }

    pub fn is_completed(&self) -> bool {
        self.completed.is_some()
    }

    /// The single active (null-valued) timer entry, if any.
    pub fn running_timer_start(&self) -> Option<&str> {
        self.active
            .iter()
            .find(|(_, end)| end.is_none())
            .map(|(start, _)| start.as_str())
    }
}

/// A request to create a new todo; the store fills in `_id`, `version`,
/// empty `active`, and `completed = null`.
#[derive(Debug, Clone, Default)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub context: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub repeat: Option<i64>,
    pub link: Option<String>,
    pub external_id: Option<String>,
    pub metadata: HashMap<String, MetadataValue>,
}

/// A partial update applied read-modify-write (§4.H `updateTodo`).
/// `None` leaves the field untouched; `Some(None)` explicitly clears a
/// nullable field.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub context: Option<Option<String>>,
    pub due: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
    pub repeat: Option<Option<i64>>,
    pub link: Option<Option<String>>,
    pub external_id: Option<Option<String>>,
    pub metadata: Option<HashMap<String, MetadataValue>>,
}

/// The completion predicate distinguishes three states (§4.E).
#[derive(Debug, Clone)]
pub enum CompletionFilter {
    Completed,
    NotCompleted,
    CompletedWithin {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct TodoQuery {
    pub context: Option<String>,
    pub completion: Option<CompletionFilter>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
    pub external_id: Option<String>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_tag_detection() {
        let mut todo = sample();
        assert!(!todo.has_calendar_tag());
        todo.tags.push("gtd:calendar".to_string());
        assert!(todo.has_calendar_tag());
    }

    #[test]
    fn running_timer_found_when_null_valued_entry_present() {
        let mut todo = sample();
        todo.active.insert("2026-01-01T00:00:00.000Z".to_string(), None);
        todo.active
            .insert("2025-12-31T00:00:00.000Z".to_string(), Some(Utc::now()));
        assert_eq!(todo.running_timer_start(), Some("2026-01-01T00:00:00.000Z"));
    }

    fn sample() -> Todo {
        Todo {
            id: "2026-01-01T00:00:00.000Z".to_string(),
            rev: None,
            title: "buy milk".to_string(),
            description: None,
            context: Some("errands".to_string()),
            due: Utc::now(),
            tags: vec![],
            completed: None,
            active: HashMap::new(),
            repeat: None,
            link: None,
            external_id: None,
            metadata: HashMap::new(),
            version: "alpha3".to_string(),
        }
    }
}
