//! Per-user append-only audit log, §4.D.

use std::sync::Arc;

use eddo_core::ambient::EnsuredSet;
use eddo_core::config::EddoConfig;
use eddo_store::{
    upsert_design_document_with_retry, DocumentStore, FindOptions, IndexSpec, ListOptions, SortDirection,
    ViewOptions,
};
use futures_util::future::join_all;
use serde_json::json;
use tracing::instrument;

use crate::error::{AuditError, Result};
use crate::types::{AuditEntry, AuditSource, ListBySourceOptions, ListOptions as AuditListOptions, ListResult};

const DEFAULT_LIMIT_PER_SOURCE: usize = 20;

/// Append-only audit log for one user's database, §4.D.
///
/// `entityId-index` is installed eagerly the first time a user's audit
/// database is created. For databases that already existed when this
/// process started, the index is created lazily on the first query that
/// filters by `entityIds`, gated by the process-wide [`EnsuredSet`] so
/// concurrent callers never race to create it twice.
pub struct AuditStore {
    store: Arc<dyn DocumentStore>,
    db_name: String,
    username: String,
    index_ensured: Arc<EnsuredSet>,
}

impl AuditStore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: &EddoConfig,
        username: &str,
        index_ensured: Arc<EnsuredSet>,
    ) -> Self {
        let db_name = eddo_core::naming::audit_database_name(config.prefix(), username);
        Self {
            store,
            db_name,
            username: username.to_string(),
            index_ensured,
        }
    }

    /// Creates the user's audit database if absent. If this call is the one
    /// that creates it, the `entityId-index` and the `by_source` view are
    /// installed immediately rather than waiting for the first query.
    #[instrument(skip(self))]
    pub async fn ensure_database(&self) -> Result<()> {
        if !self.store.db_exists(&self.db_name).await? {
            self.store.ensure_db(&self.db_name).await?;
            self.install_entity_id_index().await?;
            self.install_by_source_view().await?;
            self.index_ensured.ensure(&self.username);
        } else {
            self.store.ensure_db(&self.db_name).await?;
        }
        Ok(())
    }

    async fn install_entity_id_index(&self) -> Result<()> {
        self.store
            .create_index(
                &self.db_name,
                IndexSpec {
                    name: "entityId-index".to_string(),
                    fields: vec![
                        ("entityId".to_string(), SortDirection::Asc),
                        ("_id".to_string(), SortDirection::Asc),
                    ],
                },
            )
            .await?;
        Ok(())
    }

    /// Installs the `by_source` view emitting `[source, _id]` keys (§4.D),
    /// so `list_by_source` can query each source's bucket newest-first via
    /// the standard CouchDB composite-key prefix range rather than a Mango
    /// `use_index` that no design document backs.
    async fn install_by_source_view(&self) -> Result<()> {
        let doc = json!({
            "views": {
                "by_source": {
                    "map": "function (doc) { if (doc.source) emit([doc.source, doc._id], doc); }"
                }
            }
        });
        upsert_design_document_with_retry(self.store.as_ref(), &self.db_name, "_design/audit", doc).await?;
        Ok(())
    }

    async fn ensure_entity_id_index(&self) -> Result<()> {
        if self.index_ensured.ensure(&self.username) {
            self.install_entity_id_index().await?;
        }
        Ok(())
    }

    /// Appends a new entry. The caller supplies the full entry including
    /// `_id = timestamp`; a duplicate timestamp surfaces as `Conflict`.
    #[instrument(skip(self, entry))]
    pub async fn insert(&self, entry: AuditEntry) -> Result<AuditEntry> {
        let doc = serde_json::to_value(&entry).expect("AuditEntry always serializes");
        let saved = self.store.insert(&self.db_name, doc).await.map_err(|e| match e {
            eddo_store::StoreError::Conflict(m) => AuditError::Conflict(m),
            other => other.into(),
        })?;
        serde_json::from_value(saved).map_err(|e| AuditError::Store(eddo_store::StoreError::Other(e.to_string())))
    }

    /// Newest-first list. When `entityIds` is present, routes through the
    /// `entityId-index` secondary index; otherwise uses the primary key
    /// (timestamp) descending.
    #[instrument(skip(self, options))]
    pub async fn list(&self, options: AuditListOptions) -> Result<ListResult> {
        let limit = options.limit.unwrap_or(50);
        let probe = limit + 1;

        let docs = if let Some(entity_ids) = &options.entity_ids {
            self.ensure_entity_id_index().await?;
            let mut selector = json!({ "entityId": { "$in": entity_ids } });
            if let Some(start_after) = &options.start_after {
                selector["_id"] = json!({ "$lt": start_after });
            }
            self.store
                .find(
                    &self.db_name,
                    selector,
                    FindOptions {
                        limit: Some(probe),
                        sort: vec![("_id".to_string(), SortDirection::Desc)],
                        use_index: Some("entityId-index".to_string()),
                    },
                )
                .await?
        } else {
            self.store
                .list(
                    &self.db_name,
                    ListOptions {
                        limit: Some(probe),
                        start_key: options.start_after.clone(),
                        descending: true,
                    },
                )
                .await?
        };

        let has_more = docs.len() > limit;
        let entries: Result<Vec<AuditEntry>> = docs
            .into_iter()
            .take(limit)
            .map(|d| serde_json::from_value(d).map_err(|e| AuditError::Store(eddo_store::StoreError::Other(e.to_string()))))
            .collect();

        Ok(ListResult {
            entries: entries?,
            has_more,
        })
    }

    /// Bulk lookup; missing ids are silently elided (§4.B bulk-fetch
    /// contract), not raised.
    #[instrument(skip(self, ids))]
    pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<AuditEntry>> {
        let docs = self.store.bulk_get(&self.db_name, ids).await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| serde_json::from_value(d).ok())
            .collect())
    }

    /// For each of the six fixed sources, up to `limitPerSource` entries
    /// newest-first, via the `by_source` view's `[source, _id]` composite
    /// key queried as a bounded prefix range (§4.D). Sources are queried in
    /// parallel (fixed fan-out of six, no semaphore needed); a source whose
    /// bucket, database, or view is missing returns empty rather than
    /// failing the whole call.
    #[instrument(skip(self, options))]
    pub async fn list_by_source(
        &self,
        options: ListBySourceOptions,
    ) -> Result<Vec<(AuditSource, Vec<AuditEntry>)>> {
        let limit = options.limit_per_source.unwrap_or(DEFAULT_LIMIT_PER_SOURCE);

        let futures = AuditSource::ALL.iter().map(|source| {
            let store = Arc::clone(&self.store);
            let db_name = self.db_name.clone();
            let source = *source;
            async move {
                let result = store
                    .view(
                        &db_name,
                        "audit",
                        "by_source",
                        ViewOptions {
                            start_key: Some(json!([source.as_str(), {}])),
                            end_key: Some(json!([source.as_str()])),
                            limit: Some(limit),
                            descending: true,
                            ..Default::default()
                        },
                    )
                    .await;
                let docs = match result {
                    Ok(docs) => docs,
                    Err(eddo_store::StoreError::NotFound(_)) => Vec::new(),
                    Err(eddo_store::StoreError::InvalidQuery(_)) => Vec::new(),
                    Err(e) => return Err(AuditError::from(e)),
                };
                let entries: Vec<AuditEntry> = docs
                    .into_iter()
                    .filter_map(|d| serde_json::from_value(d).ok())
                    .collect();
                Ok((source, entries))
            }
        });

        let results = join_all(futures).await;
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuditAction;
    use eddo_store::memory::MemoryStore;

    fn test_config() -> EddoConfig {
        let mut config = EddoConfig::default();
        config.environment.node_env = "test".to_string();
        config
    }

    fn store_for(username: &str) -> AuditStore {
        let memory: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        AuditStore::new(memory, &test_config(), username, Arc::new(EnsuredSet::new()))
    }

    #[tokio::test]
    async fn insert_id_equals_timestamp() {
        let store = store_for("alice");
        store.ensure_database().await.unwrap();
        let entry = AuditEntry::new(AuditAction::Create, "T1", AuditSource::Mcp, None, None);
        let expected_id = entry.id.clone();
        let saved = store.insert(entry).await.unwrap();
        assert_eq!(saved.id, expected_id);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = store_for("alice");
        store.ensure_database().await.unwrap();
        for i in 0..3 {
            let mut entry = AuditEntry::new(AuditAction::Create, format!("T{i}"), AuditSource::Web, None, None);
            entry.id = format!("2026-01-0{}T00:00:00.000Z", i + 1);
            entry.timestamp = entry.id.parse().unwrap();
            store.insert(entry).await.unwrap();
        }

        let result = store.list(AuditListOptions::default()).await.unwrap();
        assert_eq!(result.entries.len(), 3);
        assert!(result.entries[0].id > result.entries[1].id);
        assert!(!result.has_more);
    }

    #[tokio::test]
    async fn has_more_true_when_limit_probe_exceeded() {
        let store = store_for("alice");
        store.ensure_database().await.unwrap();
        for i in 0..5 {
            let mut entry = AuditEntry::new(AuditAction::Create, format!("T{i}"), AuditSource::Web, None, None);
            entry.id = format!("2026-01-0{}T00:00:00.000Z", i + 1);
            entry.timestamp = entry.id.parse().unwrap();
            store.insert(entry).await.unwrap();
        }

        let result = store
            .list(AuditListOptions {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.entries.len(), 2);
        assert!(result.has_more);
    }

    #[tokio::test]
    async fn list_by_source_partitions_by_fixed_enum() {
        let store = store_for("alice");
        store.ensure_database().await.unwrap();
        for i in 0..25 {
            store
                .insert(AuditEntry::new(AuditAction::Create, format!("mcp{i}"), AuditSource::Mcp, None, None))
                .await
                .unwrap();
        }
        for i in 0..10 {
            store
                .insert(AuditEntry::new(AuditAction::Create, format!("web{i}"), AuditSource::Web, None, None))
                .await
                .unwrap();
        }

        let buckets = store
            .list_by_source(ListBySourceOptions {
                limit_per_source: Some(20),
            })
            .await
            .unwrap();

        let as_map: std::collections::HashMap<_, _> = buckets.into_iter().collect();
        assert_eq!(as_map[&AuditSource::Mcp].len(), 20);
        assert_eq!(as_map[&AuditSource::Web].len(), 10);
        assert_eq!(as_map[&AuditSource::Telegram].len(), 0);
        assert_eq!(as_map[&AuditSource::GithubSync].len(), 0);
    }

    #[tokio::test]
    async fn list_by_source_tolerates_a_missing_view() {
        let store = store_for("carol");
        // Simulate a database that exists but never had `ensure_database`
        // run against it, so `_design/audit` was never installed.
        store.store.ensure_db(&store.db_name).await.unwrap();

        let buckets = store
            .list_by_source(ListBySourceOptions::default())
            .await
            .unwrap();
        assert_eq!(buckets.len(), 6);
        assert!(buckets.iter().all(|(_, entries)| entries.is_empty()));
    }

    #[tokio::test]
    async fn entity_id_index_created_lazily_on_existing_database() {
        let store = store_for("bob");
        // Simulate a database that already existed before this process:
        // ensure_db directly instead of ensure_database, so the index is
        // NOT installed eagerly.
        store.store.ensure_db(&store.db_name).await.unwrap();
        assert!(!store.index_ensured.contains("bob"));

        let result = store
            .list(AuditListOptions {
                entity_ids: Some(vec!["T1".to_string()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(result.entries.is_empty());
        assert!(store.index_ensured.contains("bob"));
    }
}
