//! Repeat policy on completion, §4.E.

use chrono::{DateTime, Duration, Utc};

use crate::types::Todo;

/// Generates a todo `_id`: a sortable ISO-8601 UTC timestamp with
/// milliseconds, per §3.
pub fn generate_id(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// The anchor §4.E picks between for a repeating todo's successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatAnchor {
    /// `gtd:calendar` present: anchor on the original due date.
    Calendar,
    /// Otherwise: anchor on the completion moment.
    Habit,
}

pub fn anchor_for(todo: &Todo) -> RepeatAnchor {
    if todo.has_calendar_tag() {
        RepeatAnchor::Calendar
    } else {
        RepeatAnchor::Habit
    }
}

/// Computes the successor's `due` given the original todo, the repeat
/// interval in days, and the completion moment.
pub fn successor_due(todo: &Todo, repeat_days: i64, completed_at: DateTime<Utc>) -> DateTime<Utc> {
    let anchor = match anchor_for(todo) {
        RepeatAnchor::Calendar => todo.due,
        RepeatAnchor::Habit => completed_at,
    };
    anchor + Duration::days(repeat_days)
}

/// Builds the successor document: a fresh `_id`, empty `active`,
/// `completed = null`, and every other field copied from the original.
pub fn build_successor(todo: &Todo, repeat_days: i64, completed_at: DateTime<Utc>) -> Todo {
    let mut successor = todo.clone();
    successor.id = generate_id(completed_at);
    successor.rev = None;
    successor.due = successor_due(todo, repeat_days, completed_at);
    successor.completed = None;
    successor.active = Default::default();
    successor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(due: DateTime<Utc>, tags: Vec<&str>) -> Todo {
        Todo {
            id: generate_id(due),
            rev: None,
            title: "water plants".to_string(),
            description: None,
            context: Some("home".to_string()),
            due,
            tags: tags.into_iter().map(String::from).collect(),
            completed: None,
            active: Default::default(),
            repeat: Some(7),
            link: None,
            external_id: None,
            metadata: Default::default(),
            version: "alpha3".to_string(),
        }
    }

    #[test]
    fn calendar_tag_anchors_on_original_due() {
        let due = Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap();
        let todo = sample(due, vec!["gtd:calendar"]);
        let completed_at = Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 0).unwrap();
        let new_due = successor_due(&todo, 7, completed_at);
        assert_eq!(new_due, Utc.with_ymd_and_hms(2026, 1, 17, 15, 0, 0).unwrap());
    }

    #[test]
    fn habit_anchors_on_completion_time() {
        let due = Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap();
        let todo = sample(due, vec![]);
        let completed_at = Utc::now();
        let new_due = successor_due(&todo, 3, completed_at);
        let expected = completed_at + Duration::days(3);
        assert!((new_due - expected).num_milliseconds().abs() < 1000);
    }

    #[test]
    fn successor_has_fresh_id_and_empty_active() {
        let due = Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap();
        let mut todo = sample(due, vec![]);
        todo.active.insert("2026-01-09T00:00:00.000Z".to_string(), Some(due));
        let completed_at = Utc::now();
        let successor = build_successor(&todo, 7, completed_at);
        assert_ne!(successor.id, todo.id);
        assert!(successor.active.is_empty());
        assert!(successor.completed.is_none());
        assert_eq!(successor.title, todo.title);
    }
}
