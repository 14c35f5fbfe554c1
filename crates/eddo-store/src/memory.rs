//! In-process test double for [`DocumentStore`]. Backs unit tests across
//! the workspace so they never need a live CouchDB instance.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::{DocumentStore, FindOptions, IndexSpec, ListOptions, ViewOptions};

#[derive(Default)]
struct Db {
    docs: HashMap<String, Value>,
    rev_counter: HashMap<String, u64>,
}

#[derive(Default)]
pub struct MemoryStore {
    dbs: Mutex<HashMap<String, Db>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_rev(db: &mut Db, id: &str) -> String {
        let counter = db.rev_counter.entry(id.to_string()).or_insert(0);
        *counter += 1;
        format!("{}-{:x}", counter, md5_like(id, *counter))
    }
}

/// A deterministic stand-in for CouchDB's rev hash suffix — not a real MD5,
/// just enough entropy that revs for different ids/counters don't collide
/// in test assertions.
fn md5_like(id: &str, counter: u64) -> u64 {
    let mut hash: u64 = 1469598103934665603;
    for b in id.bytes().chain(counter.to_le_bytes()) {
        hash ^= b as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

fn matches_selector(doc: &Value, selector: &Value) -> bool {
    let Some(obj) = selector.as_object() else {
        return true;
    };
    obj.iter().all(|(field, expected)| match field.as_str() {
        "$and" => expected
            .as_array()
            .is_some_and(|clauses| clauses.iter().all(|c| matches_selector(doc, c))),
        "$or" => expected
            .as_array()
            .is_some_and(|clauses| clauses.iter().any(|c| matches_selector(doc, c))),
        _ => field_matches(doc.get(field), expected),
    })
}

fn field_matches(actual: Option<&Value>, expected: &Value) -> bool {
    if let Some(op_obj) = expected.as_object() {
        return op_obj.iter().all(|(op, operand)| match op.as_str() {
            "$eq" => actual == Some(operand),
            "$ne" => actual != Some(operand),
            "$exists" => {
                let exists = actual.is_some_and(|v| !v.is_null());
                operand.as_bool() == Some(exists)
            }
            "$gte" => compare(actual, operand).is_some_and(|o| o != std::cmp::Ordering::Less),
            "$lte" => compare(actual, operand).is_some_and(|o| o != std::cmp::Ordering::Greater),
            "$gt" => compare(actual, operand) == Some(std::cmp::Ordering::Greater),
            "$lt" => compare(actual, operand) == Some(std::cmp::Ordering::Less),
            "$in" => operand
                .as_array()
                .is_some_and(|arr| actual.is_some_and(|a| arr.contains(a))),
            _ => true,
        });
    }
    actual == Some(expected)
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<std::cmp::Ordering> {
    let a = actual?.as_str()?;
    let b = expected.as_str()?;
    Some(a.cmp(b))
}

/// Computes the key a real design document's map function would emit for
/// `doc`, for the fixed set of views this store's callers actually query.
/// Mirrors CouchDB's `emit(key, doc)` convention: the value is the whole
/// document, so a view query can stand in for a fetch-by-key.
fn emitted_key(design: &str, view: &str, doc: &Value) -> Option<Value> {
    match (design, view) {
        ("audit", "by_source") => Some(serde_json::json!([doc.get("source")?.clone(), doc.get("_id")?.clone()])),
        ("entries", "by_session") => {
            Some(serde_json::json!([doc.get("session_id")?.clone(), doc.get("_id")?.clone()]))
        }
        _ => None,
    }
}

/// CouchDB view-collation ordering, restricted to the scalar/array/object
/// shapes this store's emitted keys actually use — enough to support the
/// `[field, {}]`/`[field]` prefix-range idiom for querying one partition of
/// a composite-key view.
fn couch_collate(a: &Value, b: &Value) -> std::cmp::Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }
    let (ra, rb) = (rank(a), rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                let c = couch_collate(xi, yi);
                if c != std::cmp::Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => std::cmp::Ordering::Equal,
    }
}

/// Whether `key` falls within `[start_key, end_key]` as CouchDB would
/// interpret them for this query's direction: when `descending`, the
/// caller's `start_key` is the upper bound and `end_key` the lower one.
fn key_in_range(key: &Value, start_key: Option<&Value>, end_key: Option<&Value>, descending: bool) -> bool {
    let (lo, hi) = if descending { (end_key, start_key) } else { (start_key, end_key) };
    if let Some(lo) = lo {
        if couch_collate(key, lo) == std::cmp::Ordering::Less {
            return false;
        }
    }
    if let Some(hi) = hi {
        if couch_collate(key, hi) == std::cmp::Ordering::Greater {
            return false;
        }
    }
    true
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn db_exists(&self, db_name: &str) -> Result<bool> {
        Ok(self.dbs.lock().unwrap().contains_key(db_name))
    }

    async fn ensure_db(&self, db_name: &str) -> Result<()> {
        self.dbs.lock().unwrap().entry(db_name.to_string()).or_default();
        Ok(())
    }

    async fn get(&self, db_name: &str, id: &str) -> Result<Value> {
        let dbs = self.dbs.lock().unwrap();
        let db = dbs
            .get(db_name)
            .ok_or_else(|| StoreError::NotFound(format!("database {db_name} does not exist")))?;
        db.docs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("document {id} not found")))
    }

    async fn bulk_get(&self, db_name: &str, ids: &[String]) -> Result<Vec<Value>> {
        let dbs = self.dbs.lock().unwrap();
        let Some(db) = dbs.get(db_name) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| db.docs.get(id).cloned()).collect())
    }

    async fn insert(&self, db_name: &str, mut doc: Value) -> Result<Value> {
        let mut dbs = self.dbs.lock().unwrap();
        let db = dbs.entry(db_name.to_string()).or_default();

        let id = doc
            .get("_id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| format!("doc-{}", db.docs.len() + 1));

        if let Some(existing) = db.docs.get(&id) {
            let incoming_rev = doc.get("_rev").and_then(|v| v.as_str());
            let existing_rev = existing.get("_rev").and_then(|v| v.as_str());
            if incoming_rev != existing_rev {
                return Err(StoreError::Conflict(format!("document update conflict: {id}")));
            }
        }

        let rev = Self::next_rev(db, &id);
        doc["_id"] = serde_json::json!(id.clone());
        doc["_rev"] = serde_json::json!(rev);
        db.docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn delete(&self, db_name: &str, id: &str, rev: &str) -> Result<()> {
        let mut dbs = self.dbs.lock().unwrap();
        let db = dbs
            .get_mut(db_name)
            .ok_or_else(|| StoreError::NotFound(format!("database {db_name} does not exist")))?;
        let existing = db
            .docs
            .get(id)
            .ok_or_else(|| StoreError::NotFound(format!("document {id} not found")))?;
        if existing.get("_rev").and_then(|v| v.as_str()) != Some(rev) {
            return Err(StoreError::Conflict(format!("rev mismatch deleting {id}")));
        }
        db.docs.remove(id);
        Ok(())
    }

    async fn list(&self, db_name: &str, opts: ListOptions) -> Result<Vec<Value>> {
        let dbs = self.dbs.lock().unwrap();
        let Some(db) = dbs.get(db_name) else {
            return Ok(Vec::new());
        };
        let mut docs: Vec<Value> = db.docs.values().cloned().collect();
        docs.sort_by(|a, b| {
            let ord = a["_id"].as_str().unwrap_or("").cmp(b["_id"].as_str().unwrap_or(""));
            if opts.descending {
                ord.reverse()
            } else {
                ord
            }
        });
        if let Some(limit) = opts.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn find(&self, db_name: &str, selector: Value, opts: FindOptions) -> Result<Vec<Value>> {
        let dbs = self.dbs.lock().unwrap();
        let Some(db) = dbs.get(db_name) else {
            return Ok(Vec::new());
        };
        let mut docs: Vec<Value> = db
            .docs
            .values()
            .filter(|doc| matches_selector(doc, &selector))
            .cloned()
            .collect();

        if let Some((field, _)) = opts.sort.first() {
            docs.sort_by(|a, b| {
                a.get(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .cmp(b.get(field).and_then(|v| v.as_str()).unwrap_or(""))
            });
            if opts.sort[0].1 == crate::SortDirection::Desc {
                docs.reverse();
            }
        }

        if let Some(limit) = opts.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    async fn view(&self, db_name: &str, design: &str, view: &str, opts: ViewOptions) -> Result<Vec<Value>> {
        let design_doc_id = format!("_design/{design}");
        let dbs = self.dbs.lock().unwrap();
        let has_view = dbs
            .get(db_name)
            .is_some_and(|db| db.docs.contains_key(&design_doc_id));
        if !has_view {
            return Err(StoreError::NotFound(format!("design document {design_doc_id} not found")));
        }
        let db = dbs.get(db_name).expect("checked above");

        let mut rows: Vec<(Value, Value)> = db
            .docs
            .values()
            .filter(|d| !d.get("_id").and_then(|v| v.as_str()).unwrap_or("").starts_with("_design/"))
            .filter_map(|d| emitted_key(design, view, d).map(|k| (k, d.clone())))
            .filter(|(key, _)| key_in_range(key, opts.start_key.as_ref(), opts.end_key.as_ref(), opts.descending))
            .collect();

        rows.sort_by(|(ka, _), (kb, _)| couch_collate(ka, kb));
        if opts.descending {
            rows.reverse();
        }
        if let Some(limit) = opts.limit {
            rows.truncate(limit);
        }
        Ok(rows.into_iter().map(|(_, value)| value).collect())
    }

    async fn create_index(&self, _db_name: &str, _spec: IndexSpec) -> Result<()> {
        Ok(())
    }

    async fn put_design_document(&self, db_name: &str, doc_id: &str, mut doc: Value) -> Result<()> {
        let mut dbs = self.dbs.lock().unwrap();
        let db = dbs.entry(db_name.to_string()).or_default();
        let rev = Self::next_rev(db, doc_id);
        doc["_id"] = serde_json::json!(doc_id);
        doc["_rev"] = serde_json::json!(rev);
        db.docs.insert(doc_id.to_string(), doc);
        Ok(())
    }

    async fn get_design_document(&self, db_name: &str, doc_id: &str) -> Result<Option<Value>> {
        let dbs = self.dbs.lock().unwrap();
        Ok(dbs.get(db_name).and_then(|db| db.docs.get(doc_id).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = MemoryStore::new();
        let doc = store
            .insert("eddo_user_alice", json!({"title": "buy milk"}))
            .await
            .unwrap();
        let id = doc["_id"].as_str().unwrap().to_string();
        let fetched = store.get("eddo_user_alice", &id).await.unwrap();
        assert_eq!(fetched["title"], "buy milk");
    }

    #[tokio::test]
    async fn conflicting_write_is_rejected() {
        let store = MemoryStore::new();
        let doc = store
            .insert("db", json!({"_id": "a", "title": "one"}))
            .await
            .unwrap();
        let stale = json!({"_id": "a", "_rev": "bogus", "title": "two"});
        let _ = doc;
        let err = store.insert("db", stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn view_without_a_design_document_is_not_found() {
        let store = MemoryStore::new();
        store.insert("db", json!({"_id": "a", "source": "web"})).await.unwrap();
        let err = store
            .view("db", "audit", "by_source", ViewOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn view_queries_a_fixed_partition_newest_first() {
        let store = MemoryStore::new();
        store
            .put_design_document("db", "_design/audit", json!({"views": {"by_source": {}}}))
            .await
            .unwrap();
        store
            .insert("db", json!({"_id": "2026-01-01T00:00:00.000Z", "source": "web"}))
            .await
            .unwrap();
        store
            .insert("db", json!({"_id": "2026-01-02T00:00:00.000Z", "source": "web"}))
            .await
            .unwrap();
        store
            .insert("db", json!({"_id": "2026-01-03T00:00:00.000Z", "source": "mcp"}))
            .await
            .unwrap();

        let rows = store
            .view(
                "db",
                "audit",
                "by_source",
                ViewOptions {
                    start_key: Some(json!(["web", {}])),
                    end_key: Some(json!(["web"])),
                    descending: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["_id"], "2026-01-02T00:00:00.000Z");
        assert_eq!(rows[1]["_id"], "2026-01-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn find_filters_by_selector() {
        let store = MemoryStore::new();
        store
            .insert("db", json!({"_id": "a", "context": "work", "completed": null}))
            .await
            .unwrap();
        store
            .insert("db", json!({"_id": "b", "context": "home", "completed": null}))
            .await
            .unwrap();

        let results = store
            .find("db", json!({"context": "work"}), FindOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["_id"], "a");
    }
}
