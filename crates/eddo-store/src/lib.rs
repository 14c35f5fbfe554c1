pub mod couch;
pub mod error;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

pub use error::{Result, StoreError};

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub start_key: Option<String>,
    pub descending: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub limit: Option<usize>,
    pub sort: Vec<(String, SortDirection)>,
    pub use_index: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub start_key: Option<Value>,
    pub end_key: Option<Value>,
    pub limit: Option<usize>,
    pub descending: bool,
    pub reduce: bool,
    pub group: bool,
}

#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<(String, SortDirection)>,
}

/// Typed surface over the document database, §4.B. Every higher-level store
/// (tenant registry, audit log, todo store, chat sessions) is built on this
/// trait rather than naming `couch_rs` directly, so swapping or faking the
/// backing database never ripples past this crate.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn db_exists(&self, db_name: &str) -> Result<bool>;

    async fn ensure_db(&self, db_name: &str) -> Result<()>;

    async fn get(&self, db_name: &str, id: &str) -> Result<Value>;

    /// Bulk fetch by ids that tolerates per-id errors: missing rows are
    /// silently dropped from the result rather than raised.
    async fn bulk_get(&self, db_name: &str, ids: &[String]) -> Result<Vec<Value>>;

    /// Inserts a new document, or updates an existing one when the document
    /// carries a `_rev`. Returns the document as persisted, including the
    /// server-assigned `_id`/`_rev`.
    async fn insert(&self, db_name: &str, doc: Value) -> Result<Value>;

    async fn delete(&self, db_name: &str, id: &str, rev: &str) -> Result<()>;

    async fn list(&self, db_name: &str, opts: ListOptions) -> Result<Vec<Value>>;

    async fn find(&self, db_name: &str, selector: Value, opts: FindOptions) -> Result<Vec<Value>>;

    async fn view(&self, db_name: &str, design: &str, view: &str, opts: ViewOptions) -> Result<Vec<Value>>;

    /// Installs a Mango secondary index. Idempotent: re-installing an
    /// identically named/shaped index is a no-op.
    async fn create_index(&self, db_name: &str, spec: IndexSpec) -> Result<()>;

    /// Installs or updates a design document (views). On conflict the
    /// caller is expected to retry with the existing `_rev` re-read — see
    /// `upsert_design_document_with_retry`.
    async fn put_design_document(&self, db_name: &str, doc_id: &str, doc: Value) -> Result<()>;

    async fn get_design_document(&self, db_name: &str, doc_id: &str) -> Result<Option<Value>>;
}

/// Installs a design document, retrying on conflict by re-reading the
/// current `_rev` and rewriting — the only place in the adapter that
/// locally recovers from `Conflict`, per §4.C / §7 (≤10 tries, linear
/// backoff of 200ms × attempt).
pub async fn upsert_design_document_with_retry(
    store: &dyn DocumentStore,
    db_name: &str,
    doc_id: &str,
    mut doc: Value,
) -> Result<()> {
    const MAX_ATTEMPTS: u32 = 10;

    for attempt in 1..=MAX_ATTEMPTS {
        match store.put_design_document(db_name, doc_id, doc.clone()).await {
            Ok(()) => return Ok(()),
            Err(StoreError::Conflict(_)) => {
                if let Some(existing) = store.get_design_document(db_name, doc_id).await? {
                    if let Some(rev) = existing.get("_rev").cloned() {
                        doc["_rev"] = rev;
                    }
                }
                tokio::time::sleep(std::time::Duration::from_millis(200 * attempt as u64)).await;
                continue;
            }
            Err(other) => return Err(other),
        }
    }

    Err(StoreError::Conflict(format!(
        "failed to install design document {doc_id} after {MAX_ATTEMPTS} attempts"
    )))
}
