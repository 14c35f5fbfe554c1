//! Email-to-todo mapping, §4.J step 2.

use sha2::{Digest, Sha256};

use crate::types::IngestionItem;
use eddo_todo::NewTodo;

const MAX_DESCRIPTION_CHARS: usize = 50_000;

/// Builds a new todo from a fetched message. `externalId` is derived from
/// the folder and message id so a re-fetch of the same message is
/// idempotent under the `externalId-index` dedup lookup (§4.J step 3).
pub fn map_email_to_todo(item: &IngestionItem, default_tags: Vec<String>) -> NewTodo {
    let description = truncate_chars(&item.body, MAX_DESCRIPTION_CHARS);
    let link = item
        .gmail_message_id
        .as_ref()
        .map(|id| format!("https://mail.google.com/mail/u/0/#all/{id}"));

    NewTodo {
        title: item.subject.clone(),
        description: Some(description),
        context: Some("email".to_string()),
        due: Some(item.received_date),
        tags: default_tags,
        repeat: None,
        link,
        external_id: Some(generate_external_id(item)),
        metadata: Default::default(),
    }
}

/// `email:<folder-hash-8>/<message-id-hash-8>`, stable across re-fetches
/// of the same message in the same folder.
pub fn generate_external_id(item: &IngestionItem) -> String {
    format!(
        "email:{}/{}",
        &sha256_hex(&item.folder)[..8],
        &sha256_hex(&item.message_id)[..8]
    )
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(message_id: &str, folder: &str) -> IngestionItem {
        IngestionItem {
            subject: "hello".to_string(),
            body: "body text".to_string(),
            from: "sender@example.com".to_string(),
            from_name: None,
            received_date: Utc::now(),
            message_id: message_id.to_string(),
            uid: 1,
            folder: folder.to_string(),
            gmail_message_id: None,
        }
    }

    #[test]
    fn external_id_is_stable_for_the_same_message() {
        let a = item("msg-1", "eddo");
        let b = item("msg-1", "eddo");
        assert_eq!(generate_external_id(&a), generate_external_id(&b));
    }

    #[test]
    fn external_id_differs_across_folders() {
        let a = item("msg-1", "eddo");
        let b = item("msg-1", "eddo-processed");
        assert_ne!(generate_external_id(&a), generate_external_id(&b));
    }

    #[test]
    fn description_is_truncated_to_the_character_limit() {
        let mut long = item("msg-2", "eddo");
        long.body = "x".repeat(MAX_DESCRIPTION_CHARS + 500);
        let todo = map_email_to_todo(&long, vec!["source:email".to_string()]);
        assert_eq!(todo.description.unwrap().chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn gmail_deep_link_only_present_when_gmail_message_id_set() {
        let mut without = item("msg-3", "eddo");
        without.gmail_message_id = None;
        assert!(map_email_to_todo(&without, vec![]).link.is_none());

        let mut with = item("msg-3", "eddo");
        with.gmail_message_id = Some("abc123".to_string());
        let link = map_email_to_todo(&with, vec![]).link.unwrap();
        assert!(link.contains("abc123"));
    }
}
