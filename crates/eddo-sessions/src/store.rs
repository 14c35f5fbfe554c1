//! Chat session store, §4.F.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use eddo_core::config::EddoConfig;
use eddo_store::{upsert_design_document_with_retry, DocumentStore, ListOptions, ViewOptions};
use serde_json::{json, Value};
use tracing::instrument;

use crate::error::{Result, SessionError};
use crate::types::{ChatEntry, ChatSession, EntryPayload, NewSession, SessionStats, StatsDelta};

fn short_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..4].to_string()
}

pub struct SessionStore {
    store: Arc<dyn DocumentStore>,
    db_name: String,
}

impl SessionStore {
    pub fn new(store: Arc<dyn DocumentStore>, config: &EddoConfig, username: &str) -> Self {
        let db_name = eddo_core::naming::chat_database_name(config.prefix(), username);
        Self { store, db_name }
    }

    /// Creates the user's chat database if absent. If this call is the one
    /// that creates it, the `entries/by_session` view is installed
    /// immediately; `get_entries` still falls back to an `_all_docs` prefix
    /// scan for databases that existed before this install ran (§4.F).
    #[instrument(skip(self))]
    pub async fn ensure_database(&self) -> Result<()> {
        if !self.store.db_exists(&self.db_name).await? {
            self.store.ensure_db(&self.db_name).await?;
            self.install_by_session_view().await?;
        } else {
            self.store.ensure_db(&self.db_name).await?;
        }
        Ok(())
    }

    async fn install_by_session_view(&self) -> Result<()> {
        let doc = json!({
            "views": {
                "by_session": {
                    "map": "function (doc) { if (doc.session_id) emit([doc.session_id, doc._id], doc); }"
                }
            }
        });
        upsert_design_document_with_retry(self.store.as_ref(), &self.db_name, "_design/entries", doc).await?;
        Ok(())
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: NewSession) -> Result<ChatSession> {
        let now = Utc::now();
        let id = format!("session_{}_{}", now.timestamp_millis(), short_hex());
        let session = ChatSession {
            id,
            rev: None,
            username: request.username,
            name: request.name,
            created_at: now,
            updated_at: now,
            repository: request.repository,
            container_state: None,
            worktree_state: None,
            stats: SessionStats::default(),
            parent_session_id: request.parent_session_id,
        };

        let doc = serde_json::to_value(&session).expect("ChatSession always serializes");
        let saved = self.store.insert(&self.db_name, doc).await?;
        deserialize(saved)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, session_id: &str) -> Result<ChatSession> {
        let doc = self.store.get(&self.db_name, session_id).await.map_err(|e| match e {
            eddo_store::StoreError::NotFound(_) => SessionError::NotFound(session_id.to_string()),
            other => other.into(),
        })?;
        deserialize(doc)
    }

    /// Generates `entry_<sessionId>_<hex4>`, stamps `timestamp`, writes the
    /// entry, and — if it's a message — increments the session's stats by
    /// the delta computed purely from the payload.
    #[instrument(skip(self, parent_id, payload))]
    pub async fn append_entry(
        &self,
        session_id: &str,
        parent_id: Option<String>,
        payload: EntryPayload,
    ) -> Result<ChatEntry> {
        let now = Utc::now();
        let entry = ChatEntry {
            id: format!("entry_{session_id}_{}", short_hex()),
            rev: None,
            session_id: session_id.to_string(),
            timestamp: now,
            parent_id,
            payload,
        };

        let doc = serde_json::to_value(&entry).expect("ChatEntry always serializes");
        let saved = self.store.insert(&self.db_name, doc).await?;
        let saved_entry = deserialize_entry(saved)?;

        let delta = StatsDelta::for_payload(&saved_entry.payload);
        if delta.message_count > 0 {
            let mut session = self.get(session_id).await?;
            delta.apply(&mut session.stats);
            session.updated_at = now;
            let doc = serde_json::to_value(&session).expect("ChatSession always serializes");
            self.store.insert(&self.db_name, doc).await?;
        }

        Ok(saved_entry)
    }

    /// View query on `entries/by_session` keyed by `[sessionId, entryId]`;
    /// falls back to a prefix list over `_all_docs` if the design document
    /// is absent (§4.F). Entries are re-sorted by `timestamp` in either
    /// case, since the composite key's second component (a random-suffixed
    /// entry id) doesn't itself sort chronologically.
    #[instrument(skip(self))]
    pub async fn get_entries(&self, session_id: &str) -> Result<Vec<ChatEntry>> {
        let result = self
            .store
            .view(
                &self.db_name,
                "entries",
                "by_session",
                ViewOptions {
                    start_key: Some(json!([session_id])),
                    end_key: Some(json!([session_id, {}])),
                    ..Default::default()
                },
            )
            .await;

        let docs = match result {
            Ok(docs) => docs,
            Err(eddo_store::StoreError::NotFound(_)) | Err(eddo_store::StoreError::InvalidQuery(_)) => {
                self.entries_by_all_docs_prefix(session_id).await?
            }
            Err(e) => return Err(e.into()),
        };

        let mut entries: Vec<ChatEntry> = docs.into_iter().map(deserialize_entry).collect::<Result<_>>()?;
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    /// `_all_docs` prefix scan used when the `entries/by_session` design
    /// document hasn't been installed for this database yet (§4.F).
    async fn entries_by_all_docs_prefix(&self, session_id: &str) -> Result<Vec<Value>> {
        let prefix = format!("entry_{session_id}_");
        let docs = self.store.list(&self.db_name, ListOptions::default()).await?;
        Ok(docs
            .into_iter()
            .filter(|d| d.get("_id").and_then(|v| v.as_str()).is_some_and(|id| id.starts_with(&prefix)))
            .collect())
    }

    /// If `from_entry_id` is absent, returns all entries in chronological
    /// order. Otherwise walks `parent_id` pointers backward from the leaf
    /// to the root and returns the path in chronological order. A broken
    /// chain (a `parent_id` with no matching entry) terminates the walk
    /// silently rather than erroring.
    #[instrument(skip(self))]
    pub async fn get_branch(&self, session_id: &str, from_entry_id: Option<&str>) -> Result<Vec<ChatEntry>> {
        let entries = self.get_entries(session_id).await?;

        let Some(leaf_id) = from_entry_id else {
            return Ok(entries);
        };

        let by_id: HashMap<&str, &ChatEntry> = entries.iter().map(|e| (e.id.as_str(), e)).collect();

        let mut path = Vec::new();
        let mut current = by_id.get(leaf_id).copied();
        while let Some(entry) = current {
            path.push(entry.clone());
            current = entry.parent_id.as_deref().and_then(|parent| by_id.get(parent).copied());
        }
        path.reverse();
        Ok(path)
    }

    /// Deletes all entries for the session first, then the session
    /// document itself.
    #[instrument(skip(self))]
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        let entries = self.get_entries(session_id).await?;
        for entry in entries {
            if let Some(rev) = &entry.rev {
                self.store.delete(&self.db_name, &entry.id, rev).await?;
            }
        }

        let doc = self.store.get(&self.db_name, session_id).await.map_err(|e| match e {
            eddo_store::StoreError::NotFound(_) => SessionError::NotFound(session_id.to_string()),
            other => other.into(),
        })?;
        let rev = doc.get("_rev").and_then(|v| v.as_str()).expect("session doc always has a rev");
        self.store.delete(&self.db_name, session_id, rev).await?;
        Ok(())
    }
}

fn deserialize(doc: serde_json::Value) -> Result<ChatSession> {
    serde_json::from_value(doc).map_err(|e| SessionError::Store(eddo_store::StoreError::Other(e.to_string())))
}

fn deserialize_entry(doc: serde_json::Value) -> Result<ChatEntry> {
    serde_json::from_value(doc).map_err(|e| SessionError::Store(eddo_store::StoreError::Other(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentItem, MessagePayload, Role, Usage};
    use eddo_store::memory::MemoryStore;

    fn test_config() -> EddoConfig {
        let mut config = EddoConfig::default();
        config.environment.node_env = "test".to_string();
        config
    }

    fn store() -> SessionStore {
        let memory: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        SessionStore::new(memory, &test_config(), "alice")
    }

    fn user_message() -> EntryPayload {
        EntryPayload::Message(MessagePayload {
            role: Role::User,
            content: vec![ContentItem::Text { text: "hi".to_string() }],
            usage: None,
        })
    }

    fn assistant_message() -> EntryPayload {
        EntryPayload::Message(MessagePayload {
            role: Role::Assistant,
            content: vec![ContentItem::Text { text: "hello".to_string() }],
            usage: Some(Usage {
                input_tokens: 5,
                output_tokens: 8,
                total_cost: 0.01,
            }),
        })
    }

    #[tokio::test]
    async fn create_initializes_zeroed_stats() {
        let store = store();
        let session = store
            .create(NewSession {
                username: "alice".to_string(),
                name: "debugging".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(session.stats.message_count, 0);
        assert!(session.id.starts_with("session_"));
    }

    #[tokio::test]
    async fn append_entry_updates_session_stats() {
        let store = store();
        let session = store
            .create(NewSession {
                username: "alice".to_string(),
                name: "debugging".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        store.append_entry(&session.id, None, user_message()).await.unwrap();
        store.append_entry(&session.id, None, assistant_message()).await.unwrap();

        let updated = store.get(&session.id).await.unwrap();
        assert_eq!(updated.stats.message_count, 2);
        assert_eq!(updated.stats.user_message_count, 1);
        assert_eq!(updated.stats.assistant_message_count, 1);
        assert_eq!(updated.stats.input_tokens, 5);
        assert_eq!(updated.stats.output_tokens, 8);
    }

    #[tokio::test]
    async fn get_branch_walks_parent_pointers_to_root() {
        let store = store();
        let session = store
            .create(NewSession {
                username: "alice".to_string(),
                name: "debugging".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let root = store.append_entry(&session.id, None, user_message()).await.unwrap();
        let mid = store
            .append_entry(&session.id, Some(root.id.clone()), assistant_message())
            .await
            .unwrap();
        let leaf = store
            .append_entry(&session.id, Some(mid.id.clone()), user_message())
            .await
            .unwrap();

        let branch = store.get_branch(&session.id, Some(&leaf.id)).await.unwrap();
        assert_eq!(branch.len(), 3);
        assert_eq!(branch[0].id, root.id);
        assert_eq!(branch[1].id, mid.id);
        assert_eq!(branch[2].id, leaf.id);
    }

    #[tokio::test]
    async fn get_branch_with_broken_chain_terminates_silently() {
        let store = store();
        let session = store
            .create(NewSession {
                username: "alice".to_string(),
                name: "debugging".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let orphan = store
            .append_entry(&session.id, Some("entry_missing_0000".to_string()), user_message())
            .await
            .unwrap();

        let branch = store.get_branch(&session.id, Some(&orphan.id)).await.unwrap();
        assert_eq!(branch.len(), 1);
        assert_eq!(branch[0].id, orphan.id);
    }

    #[tokio::test]
    async fn get_entries_uses_the_installed_view_when_present() {
        let store = store();
        store.ensure_database().await.unwrap();
        let session = store
            .create(NewSession {
                username: "alice".to_string(),
                name: "debugging".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let first = store.append_entry(&session.id, None, user_message()).await.unwrap();
        let second = store
            .append_entry(&session.id, Some(first.id.clone()), assistant_message())
            .await
            .unwrap();

        let entries = store.get_entries(&session.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, first.id);
        assert_eq!(entries[1].id, second.id);
    }

    #[tokio::test]
    async fn delete_removes_entries_then_session() {
        let store = store();
        let session = store
            .create(NewSession {
                username: "alice".to_string(),
                name: "debugging".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        store.append_entry(&session.id, None, user_message()).await.unwrap();

        store.delete(&session.id).await.unwrap();
        assert!(store.get(&session.id).await.is_err());
        assert!(store.get_entries(&session.id).await.unwrap().is_empty());
    }
}
