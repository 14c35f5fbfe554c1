//! `couch_rs`-backed implementation of [`DocumentStore`].
//!
//! `couch_rs` implements `TypedCouchDocument` for `serde_json::Value`
//! directly (reading/writing the `_id`/`_rev` keys at the JSON level), so
//! the whole adapter works against `Value` without a generated document
//! type per database — the shape this crate needs, since the todo/audit/
//! session/registry layers each own their own (de)serialization.

use async_trait::async_trait;
use couch_rs::database::Database;
use couch_rs::types::find::FindQuery;
use couch_rs::types::query::QueriesParams;
use couch_rs::Client;
use serde_json::{json, Value};
use tracing::instrument;

use crate::error::{Result, StoreError};
use crate::{DocumentStore, FindOptions, IndexSpec, ListOptions, SortDirection, ViewOptions};

pub struct CouchStore {
    client: Client,
}

impl CouchStore {
    pub fn connect(uri: &str) -> Result<Self> {
        let client = Client::new_no_auth(uri).map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn connect_with_auth(uri: &str, username: &str, password: &str) -> Result<Self> {
        let client =
            Client::new(uri, username, password).map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    async fn db(&self, db_name: &str) -> Result<Database> {
        self.client
            .db(db_name)
            .await
            .map_err(StoreError::from_couch)
    }
}

#[async_trait]
impl DocumentStore for CouchStore {
    #[instrument(skip(self))]
    async fn db_exists(&self, db_name: &str) -> Result<bool> {
        let dbs = self
            .client
            .list_dbs()
            .await
            .map_err(StoreError::from_couch)?;
        Ok(dbs.iter().any(|d| d == db_name))
    }

    #[instrument(skip(self))]
    async fn ensure_db(&self, db_name: &str) -> Result<()> {
        if self.db_exists(db_name).await? {
            return Ok(());
        }
        match self.client.make_db(db_name).await {
            Ok(_) => Ok(()),
            Err(e) if e.status == couch_rs::error::StatusCode::PRECONDITION_FAILED => Ok(()),
            Err(e) => Err(StoreError::from_couch(e)),
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, db_name: &str, id: &str) -> Result<Value> {
        let db = self.db(db_name).await?;
        db.get::<Value>(id).await.map_err(StoreError::from_couch)
    }

    #[instrument(skip(self, ids))]
    async fn bulk_get(&self, db_name: &str, ids: &[String]) -> Result<Vec<Value>> {
        let db = self.db(db_name).await?;
        let params = QueriesParams::new(ids.iter().cloned());
        let responses = db
            .get_bulk_params::<Value>(ids.to_vec(), Some(params))
            .await
            .map_err(StoreError::from_couch)?;
        // Per-id failures (not-found rows) are dropped, not raised.
        Ok(responses.rows.into_iter().filter_map(|row| row.doc).collect())
    }

    #[instrument(skip(self, doc))]
    async fn insert(&self, db_name: &str, mut doc: Value) -> Result<Value> {
        let db = self.db(db_name).await?;
        db.save(&mut doc).await.map_err(StoreError::from_couch)?;
        Ok(doc)
    }

    #[instrument(skip(self))]
    async fn delete(&self, db_name: &str, id: &str, rev: &str) -> Result<()> {
        let db = self.db(db_name).await?;
        let doc = json!({"_id": id, "_rev": rev});
        let removed = db.remove(&doc).await;
        if removed {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "failed to delete {id} at rev {rev}"
            )))
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, db_name: &str, opts: ListOptions) -> Result<Vec<Value>> {
        let db = self.db(db_name).await?;
        let mut view_opts = couch_rs::types::view::CouchViewParams::default();
        view_opts.include_docs = Some(true);
        view_opts.descending = Some(opts.descending);
        if let Some(limit) = opts.limit {
            view_opts.limit = Some(limit as u64);
        }
        if let Some(start) = &opts.start_key {
            view_opts.startkey = Some(json!(start));
        }

        let all_docs = db
            .get_all_params::<Value>(Some(view_opts))
            .await
            .map_err(StoreError::from_couch)?;

        Ok(all_docs
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .collect())
    }

    #[instrument(skip(self, selector))]
    async fn find(&self, db_name: &str, selector: Value, opts: FindOptions) -> Result<Vec<Value>> {
        let db = self.db(db_name).await?;

        let mut query = FindQuery::new(selector);
        if let Some(limit) = opts.limit {
            query.limit = Some(limit as u32);
        }
        if !opts.sort.is_empty() {
            query.sort = Some(
                opts.sort
                    .iter()
                    .map(|(field, dir)| {
                        let direction = match dir {
                            SortDirection::Asc => "asc",
                            SortDirection::Desc => "desc",
                        };
                        json!({ field.clone(): direction })
                    })
                    .collect(),
            );
        }
        if let Some(index) = &opts.use_index {
            query.use_index = Some(couch_rs::types::find::UseIndex::Str(index.clone()));
        }

        let result = db.find::<Value>(&query).await.map_err(|e| {
            if e.status == couch_rs::error::StatusCode::BAD_REQUEST {
                StoreError::InvalidQuery(e.message)
            } else {
                StoreError::from_couch(e)
            }
        })?;

        Ok(result.rows)
    }

    #[instrument(skip(self))]
    async fn view(&self, db_name: &str, design: &str, view: &str, opts: ViewOptions) -> Result<Vec<Value>> {
        let db = self.db(db_name).await?;
        let mut params = couch_rs::types::view::CouchViewParams::default();
        params.descending = Some(opts.descending);
        params.reduce = Some(opts.reduce);
        params.group = Some(opts.group);
        if let Some(limit) = opts.limit {
            params.limit = Some(limit as u64);
        }
        if let Some(key) = opts.start_key {
            params.startkey = Some(key);
        }
        if let Some(key) = opts.end_key {
            params.endkey = Some(key);
        }

        let result = db
            .query_view::<Value, Value>(design, view, Some(params))
            .await
            .map_err(|e| {
                if e.status == couch_rs::error::StatusCode::NOT_FOUND {
                    StoreError::NotFound(format!("view {design}/{view} not found"))
                } else {
                    StoreError::from_couch(e)
                }
            })?;

        Ok(result
            .rows
            .into_iter()
            .map(|row| row.value)
            .collect())
    }

    #[instrument(skip(self))]
    async fn create_index(&self, db_name: &str, spec: IndexSpec) -> Result<()> {
        let db = self.db(db_name).await?;
        let fields: Vec<String> = spec.fields.iter().map(|(f, _)| f.clone()).collect();
        db.insert_index(spec.name, fields)
            .await
            .map_err(StoreError::from_couch)?;
        Ok(())
    }

    #[instrument(skip(self, doc))]
    async fn put_design_document(&self, db_name: &str, doc_id: &str, mut doc: Value) -> Result<()> {
        let db = self.db(db_name).await?;
        doc["_id"] = json!(doc_id);
        db.save(&mut doc).await.map_err(StoreError::from_couch)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_design_document(&self, db_name: &str, doc_id: &str) -> Result<Option<Value>> {
        let db = self.db(db_name).await?;
        match db.get::<Value>(doc_id).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.status == couch_rs::error::StatusCode::NOT_FOUND => Ok(None),
            Err(e) => Err(StoreError::from_couch(e)),
        }
    }
}
