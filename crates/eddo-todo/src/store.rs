//! Todo store & version engine, §4.E: a typed layer over the document
//! store adapter plus query index selection, repeat-on-completion policy,
//! lazy migration on read, and time tracking.

use std::sync::Arc;

use chrono::Utc;
use eddo_core::config::EddoConfig;
use eddo_store::{DocumentStore, FindOptions, SortDirection};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::error::{Result, TodoError};
use crate::index::{self, SelectedQuery};
use crate::repeat;
use crate::types::{NewTodo, Todo, TodoPatch, TodoQuery};
use crate::version::{self, is_latest_version};

pub struct TodoStore {
    store: Arc<dyn DocumentStore>,
    db_name: String,
}

impl TodoStore {
    pub fn new(store: Arc<dyn DocumentStore>, config: &EddoConfig, username: &str) -> Self {
        let db_name = eddo_core::naming::user_database_name(config.prefix(), username);
        Self { store, db_name }
    }

    #[instrument(skip(self))]
    pub async fn ensure_database(&self) -> Result<()> {
        self.store.ensure_db(&self.db_name).await?;
        Ok(())
    }

    /// Installs the five pre-declared query indices (§4.E) plus
    /// `externalId-index`. Idempotent.
    #[instrument(skip(self))]
    pub async fn setup_indices(&self) -> Result<()> {
        use eddo_store::IndexSpec;

        let indices = [
            (index::VERSION_DUE_INDEX, vec!["version", "due"]),
            (index::VERSION_CONTEXT_DUE_INDEX, vec!["version", "context", "due"]),
            (index::VERSION_COMPLETED_DUE_INDEX, vec!["version", "completed", "due"]),
            (
                index::VERSION_CONTEXT_COMPLETED_DUE_INDEX,
                vec!["version", "context", "completed", "due"],
            ),
            (index::EXTERNAL_ID_INDEX, vec!["externalId"]),
        ];

        for (name, fields) in indices {
            self.store
                .create_index(
                    &self.db_name,
                    IndexSpec {
                        name: name.to_string(),
                        fields: fields
                            .into_iter()
                            .map(|f| (f.to_string(), SortDirection::Asc))
                            .collect(),
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// `due` defaults to end-of-current-day UTC when absent (§4.H).
    #[instrument(skip(self, new_todo))]
    pub async fn create(&self, new_todo: NewTodo) -> Result<Todo> {
        let now = Utc::now();
        let todo = Todo {
            id: repeat::generate_id(now),
            rev: None,
            title: new_todo.title,
            description: new_todo.description,
            context: new_todo.context,
            due: new_todo.due.unwrap_or_else(|| version::end_of_day(now)),
            tags: new_todo.tags,
            completed: None,
            active: Default::default(),
            repeat: new_todo.repeat,
            link: new_todo.link,
            external_id: new_todo.external_id,
            metadata: new_todo.metadata,
            version: "alpha3".to_string(),
        };

        let doc = serde_json::to_value(&todo).expect("Todo always serializes");
        let saved = self.store.insert(&self.db_name, doc).await?;
        self.deserialize(saved)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Todo> {
        let doc = self
            .store
            .get(&self.db_name, id)
            .await
            .map_err(|e| match e {
                eddo_store::StoreError::NotFound(_) => TodoError::NotFound(id.to_string()),
                other => other.into(),
            })?;
        self.migrate_on_read(doc).await
    }

    /// Builds a selector per §4.E's index-selection table and returns the
    /// matching documents, each migrated to alpha3 on the way out.
    #[instrument(skip(self, query))]
    pub async fn list(&self, query: TodoQuery) -> Result<Vec<Todo>> {
        if !self.store.db_exists(&self.db_name).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let SelectedQuery {
            selector,
            index,
            sort_ascending_by_due,
        } = index::select(&query)?;

        let sort = if sort_ascending_by_due {
            vec![("due".to_string(), SortDirection::Asc)]
        } else {
            Vec::new()
        };

        let docs = match self
            .store
            .find(
                &self.db_name,
                selector,
                FindOptions {
                    limit: query.limit,
                    sort,
                    use_index: Some(index.to_string()),
                },
            )
            .await
        {
            Ok(docs) => docs,
            Err(eddo_store::StoreError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            out.push(self.migrate_on_read(doc).await?);
        }
        Ok(out)
    }

    /// Read-modify-write; fields absent from `patch` are preserved.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: TodoPatch) -> Result<Todo> {
        let mut todo = self.get(id).await?;

        if let Some(title) = patch.title {
            todo.title = title;
        }
        if let Some(description) = patch.description {
            todo.description = description;
        }
        if let Some(context) = patch.context {
            todo.context = context;
        }
        if let Some(due) = patch.due {
            todo.due = due;
        }
        if let Some(tags) = patch.tags {
            todo.tags = tags;
        }
        if let Some(repeat) = patch.repeat {
            todo.repeat = repeat;
        }
        if let Some(link) = patch.link {
            todo.link = link;
        }
        if let Some(external_id) = patch.external_id {
            todo.external_id = external_id;
        }
        if let Some(metadata) = patch.metadata {
            todo.metadata = metadata;
        }

        self.persist(todo).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let doc = self.store.get(&self.db_name, id).await.map_err(|e| match e {
            eddo_store::StoreError::NotFound(_) => TodoError::NotFound(id.to_string()),
            other => other.into(),
        })?;
        let rev = doc
            .get("_rev")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TodoError::NotFound(id.to_string()))?;
        self.store.delete(&self.db_name, id, rev).await?;
        Ok(())
    }

    /// `toggleTodoCompletion`: applies the repeat policy (§4.E) when
    /// transitioning to completed with `repeat` set. Both the completion
    /// write and the successor write are required; a partial failure
    /// (successor write fails after the completion write succeeds) is
    /// surfaced as an error, leaving the audit log with only the
    /// completion event (§4.E, Open Question in §9).
    #[instrument(skip(self))]
    pub async fn toggle_completion(&self, id: &str, completed: bool) -> Result<ToggleCompletionResult> {
        let mut todo = self.get(id).await?;
        let now = Utc::now();

        if completed {
            todo.completed = Some(now);
            let saved = self.persist(todo.clone()).await?;

            if let Some(repeat_days) = todo.repeat {
                let anchor = repeat::anchor_for(&todo);
                let successor = repeat::build_successor(&todo, repeat_days, now);
                let created = self.create_successor(successor).await?;
                return Ok(ToggleCompletionResult {
                    todo: saved,
                    successor: Some(created.clone()),
                    repeat_anchor: Some(anchor),
                    new_due_date: Some(created.due),
                });
            }

            Ok(ToggleCompletionResult {
                todo: saved,
                successor: None,
                repeat_anchor: None,
                new_due_date: None,
            })
        } else {
            todo.completed = None;
            let saved = self.persist(todo).await?;
            Ok(ToggleCompletionResult {
                todo: saved,
                successor: None,
                repeat_anchor: None,
                new_due_date: None,
            })
        }
    }

    async fn create_successor(&self, successor: Todo) -> Result<Todo> {
        let doc = serde_json::to_value(&successor).expect("Todo always serializes");
        let saved = self.store.insert(&self.db_name, doc).await?;
        self.deserialize(saved)
    }

    /// Adds a key equal to the current timestamp to `active` with value
    /// null. §4.E says a second concurrent session should be rejected; the
    /// upstream source never enforced this on write (§9 Open Question), but
    /// this spec requires rejection.
    #[instrument(skip(self))]
    pub async fn start_time_tracking(&self, id: &str) -> Result<Todo> {
        let mut todo = self.get(id).await?;
        if todo.running_timer_start().is_some() {
            return Err(TodoError::Validation(format!(
                "todo {id} already has a running time-tracking session"
            )));
        }
        let now = Utc::now();
        todo.active.insert(repeat::generate_id(now), None);
        self.persist(todo).await
    }

    /// Finds the single null-valued entry and sets it to now. A no-op
    /// (returns `NoActiveSession`) when there is none.
    #[instrument(skip(self))]
    pub async fn stop_time_tracking(&self, id: &str) -> Result<Todo> {
        let mut todo = self.get(id).await?;
        let Some(start) = todo.running_timer_start().map(String::from) else {
            return Err(TodoError::NoActiveSession);
        };
        todo.active.insert(start, Some(Utc::now()));
        self.persist(todo).await
    }

    /// Scans todos whose `active` contains any null-valued entry.
    #[instrument(skip(self))]
    pub async fn active_time_tracking(&self) -> Result<Vec<Todo>> {
        let all = self
            .list(TodoQuery {
                ..Default::default()
            })
            .await?;
        Ok(all.into_iter().filter(|t| t.running_timer_start().is_some()).collect())
    }

    async fn persist(&self, todo: Todo) -> Result<Todo> {
        let doc = serde_json::to_value(&todo).expect("Todo always serializes");
        let saved = self.store.insert(&self.db_name, doc).await?;
        self.deserialize(saved)
    }

    fn deserialize(&self, doc: Value) -> Result<Todo> {
        serde_json::from_value(doc).map_err(|e| TodoError::Store(eddo_store::StoreError::Other(e.to_string())))
    }

    /// Migrates the stored document to alpha3 on read. If the document was
    /// not already at the latest version, fires an unawaited write-back;
    /// the caller's response is unaffected by whether that write succeeds.
    async fn migrate_on_read(&self, doc: Value) -> Result<Todo> {
        let needs_migration = !is_latest_version(&doc);
        let todo = version::migrate_todo(doc).map_err(|e| TodoError::Store(eddo_store::StoreError::Other(e.to_string())))?;

        if needs_migration {
            let store = Arc::clone(&self.store);
            let db_name = self.db_name.clone();
            let migrated = todo.clone();
            tokio::spawn(async move {
                let doc = serde_json::to_value(&migrated).expect("Todo always serializes");
                match store.insert(&db_name, doc).await {
                    Ok(_) => debug!(id = %migrated.id, "migrated todo to alpha3 in background"),
                    Err(e) => warn!(id = %migrated.id, error = %e, "background todo migration write failed"),
                }
            });
        }

        Ok(todo)
    }
}

#[derive(Debug, Clone)]
pub struct ToggleCompletionResult {
    pub todo: Todo,
    pub successor: Option<Todo>,
    pub repeat_anchor: Option<repeat::RepeatAnchor>,
    pub new_due_date: Option<chrono::DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use eddo_store::memory::MemoryStore;

    fn test_config() -> EddoConfig {
        let mut config = EddoConfig::default();
        config.environment.node_env = "test".to_string();
        config
    }

    fn store() -> TodoStore {
        let memory: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        TodoStore::new(memory, &test_config(), "alice")
    }

    #[tokio::test]
    async fn created_todo_defaults_due_to_end_of_day() {
        let store = store();
        let todo = store
            .create(NewTodo {
                title: "Buy milk".to_string(),
                context: Some("errands".to_string()),
                tags: vec!["gtd:next".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(todo.version, "alpha3");
        assert!(todo.completed.is_none());
        assert_eq!(todo.due.format("%H:%M:%S%.3f").to_string(), "23:59:59.999");
    }

    #[tokio::test]
    async fn create_then_list_by_context() {
        let store = store();
        let created = store
            .create(NewTodo {
                title: "Buy milk".to_string(),
                context: Some("errands".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let found = store
            .list(TodoQuery {
                context: Some("errands".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, created.id);
    }

    #[tokio::test]
    async fn complete_with_calendar_repeat_sets_new_due_from_original() {
        use chrono::TimeZone;

        let store = store();
        let due = Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap();
        let created = store
            .create(NewTodo {
                title: "pay rent".to_string(),
                due: Some(due),
                repeat: Some(7),
                tags: vec!["gtd:calendar".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        let result = store.toggle_completion(&created.id, true).await.unwrap();
        assert!(result.todo.completed.is_some());
        let successor = result.successor.unwrap();
        assert_eq!(successor.due, Utc.with_ymd_and_hms(2026, 1, 17, 15, 0, 0).unwrap());
        assert_ne!(successor.id, created.id);
    }

    #[tokio::test]
    async fn complete_with_habit_repeat_anchors_on_now() {
        let store = store();
        let created = store
            .create(NewTodo {
                title: "water plants".to_string(),
                repeat: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();

        let before = Utc::now();
        let result = store.toggle_completion(&created.id, true).await.unwrap();
        let successor = result.successor.unwrap();
        let expected = before + chrono::Duration::days(3);
        assert!((successor.due - expected).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn time_tracking_start_then_stop() {
        let store = store();
        let created = store
            .create(NewTodo {
                title: "focus block".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let started = store.start_time_tracking(&created.id).await.unwrap();
        assert!(started.running_timer_start().is_some());

        let stopped = store.stop_time_tracking(&created.id).await.unwrap();
        assert!(stopped.running_timer_start().is_none());
    }

    #[tokio::test]
    async fn stop_without_active_session_is_no_op_error() {
        let store = store();
        let created = store
            .create(NewTodo {
                title: "focus block".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = store.stop_time_tracking(&created.id).await.unwrap_err();
        assert!(matches!(err, TodoError::NoActiveSession));
    }

    #[tokio::test]
    async fn second_concurrent_session_is_rejected() {
        let store = store();
        let created = store
            .create(NewTodo {
                title: "focus block".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        store.start_time_tracking(&created.id).await.unwrap();
        let err = store.start_time_tracking(&created.id).await.unwrap_err();
        assert!(matches!(err, TodoError::Validation(_)));
    }

    #[tokio::test]
    async fn list_on_missing_database_is_empty_not_error() {
        let memory: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let store = TodoStore::new(memory, &test_config(), "nobody");
        let result = store.list(TodoQuery::default()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn migrates_alpha1_document_to_alpha3_on_read() {
        let store = store();
        store.ensure_database().await.unwrap();
        let legacy = json!({
            "_id": "2026-01-01T00:00:00.000Z",
            "title": "legacy todo",
            "tags": [],
        });
        store.store.insert(&store.db_name, legacy).await.unwrap();

        let todo = store.get("2026-01-01T00:00:00.000Z").await.unwrap();
        assert_eq!(todo.version, "alpha3");
    }
}
