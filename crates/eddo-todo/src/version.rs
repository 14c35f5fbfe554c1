//! Todo schema versions and the `alpha1 -> alpha2 -> alpha3` migration
//! chain, §4.A / §4.E.
//!
//! Version detection is a pure structural predicate on a decoded document
//! (not just the `version` tag) so documents written before the `version`
//! field existed still classify correctly.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::types::Todo;

pub fn is_todo_alpha1(doc: &Value) -> bool {
    let version = doc.get("version").and_then(|v| v.as_str());
    match version {
        Some("alpha2") | Some("alpha3") => false,
        Some("alpha1") => true,
        _ => doc.get("context").is_none() && doc.get("active").is_none(),
    }
}

pub fn is_todo_alpha2(doc: &Value) -> bool {
    if doc.get("version").and_then(|v| v.as_str()) == Some("alpha2") {
        return true;
    }
    !is_todo_alpha1(doc)
        && doc.get("externalId").is_none()
        && doc.get("link").is_none()
        && doc.get("metadata").is_none()
        && doc.get("version").and_then(|v| v.as_str()) != Some("alpha3")
}

pub fn is_todo_alpha3(doc: &Value) -> bool {
    doc.get("version").and_then(|v| v.as_str()) == Some("alpha3")
        || (doc.get("externalId").is_some() || doc.get("link").is_some() || doc.get("metadata").is_some())
}

pub fn is_latest_version(doc: &Value) -> bool {
    is_todo_alpha3(doc)
}

/// End-of-current-day in UTC, `23:59:59.999`, used both as the default
/// `due` for `createTodo` (§4.H) and as the migration fallback for alpha1
/// documents that predate a mandatory `due` field.
pub fn end_of_day(day: DateTime<Utc>) -> DateTime<Utc> {
    day.date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .expect("23:59:59.999 is always valid")
        .and_utc()
}

/// Total function over any prior version document; idempotent on alpha3
/// inputs. Returns a fully-populated alpha3 [`Todo`].
pub fn migrate_todo(mut doc: Value) -> Result<Todo, serde_json::Error> {
    if is_todo_alpha1(&doc) {
        doc = upgrade_alpha1_to_alpha2(doc);
    }
    if is_todo_alpha2(&doc) {
        doc = upgrade_alpha2_to_alpha3(doc);
    }
    doc["version"] = json!("alpha3");
    serde_json::from_value(doc)
}

fn upgrade_alpha1_to_alpha2(mut doc: Value) -> Value {
    if doc.get("due").is_none() {
        let created_at = doc
            .get("_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<DateTime<Utc>>().ok())
            .unwrap_or_else(Utc::now);
        doc["due"] = json!(end_of_day(created_at));
    }
    if doc.get("context").is_none() {
        doc["context"] = Value::Null;
    }
    if doc.get("active").is_none() {
        doc["active"] = json!({});
    }
    if doc.get("repeat").is_none() {
        doc["repeat"] = Value::Null;
    }
    if doc.get("tags").is_none() {
        doc["tags"] = json!([]);
    }
    doc["version"] = json!("alpha2");
    doc
}

fn upgrade_alpha2_to_alpha3(mut doc: Value) -> Value {
    if doc.get("externalId").is_none() {
        doc["externalId"] = Value::Null;
    }
    if doc.get("link").is_none() {
        doc["link"] = Value::Null;
    }
    if doc.get("metadata").is_none() {
        doc["metadata"] = json!({});
    }
    doc["version"] = json!("alpha3");
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha1_detected_by_absence_of_context_and_active() {
        let doc = json!({
            "_id": "2026-01-01T00:00:00.000Z",
            "title": "legacy todo",
            "tags": [],
        });
        assert!(is_todo_alpha1(&doc));
        assert!(!is_todo_alpha2(&doc));
        assert!(!is_latest_version(&doc));
    }

    #[test]
    fn migration_chain_always_lands_on_alpha3() {
        for doc in [
            json!({"_id": "2026-01-01T00:00:00.000Z", "title": "a", "tags": []}),
            json!({
                "_id": "2026-01-01T00:00:00.000Z", "title": "b", "context": "work",
                "due": "2026-01-01T23:59:59.999Z", "tags": [], "active": {}, "repeat": null,
            }),
            json!({
                "_id": "2026-01-01T00:00:00.000Z", "title": "c", "context": "work",
                "due": "2026-01-01T23:59:59.999Z", "tags": [], "active": {}, "repeat": null,
                "externalId": null, "link": null, "metadata": {}, "version": "alpha3",
            }),
        ] {
            let todo = migrate_todo(doc).unwrap();
            assert_eq!(todo.version, "alpha3");
        }
    }

    #[test]
    fn migration_is_idempotent_on_alpha3_input() {
        let doc = json!({
            "_id": "2026-01-01T00:00:00.000Z", "title": "c", "context": "work",
            "due": "2026-01-01T23:59:59.999Z", "tags": [], "active": {}, "repeat": null,
            "externalId": null, "link": null, "metadata": {}, "version": "alpha3",
        });
        let once = migrate_todo(doc.clone()).unwrap();
        let twice = migrate_todo(serde_json::to_value(&once).unwrap()).unwrap();
        assert_eq!(serde_json::to_value(&once).unwrap(), serde_json::to_value(&twice).unwrap());
    }
}
