use std::sync::{Arc, Mutex};

use chrono::Utc;
use eddo_core::config::EddoConfig;
use eddo_store::{upsert_design_document_with_retry, DocumentStore, FindOptions};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::error::{Result, UserError};
use crate::types::{NewUser, Permission, UserEntry, UserPatch, UserStatus};

/// Hot-lookup cache bound, mirroring the teacher's identity-resolution
/// cache: write-through, evict-oldest-half when full.
const CACHE_MAX: usize = 256;

struct LookupCache {
    entries: Mutex<std::collections::HashMap<String, String>>,
    order: Mutex<Vec<String>>,
}

impl LookupCache {
    fn new() -> Self {
        Self {
            entries: Mutex::new(std::collections::HashMap::new()),
            order: Mutex::new(Vec::new()),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn insert(&self, key: String, user_id: String) {
        let mut entries = self.entries.lock().unwrap();
        let mut order = self.order.lock().unwrap();
        if !entries.contains_key(&key) {
            order.push(key.clone());
        }
        entries.insert(key, user_id);

        if order.len() > CACHE_MAX {
            let evict_count = order.len() / 2;
            let to_evict: Vec<String> = order.drain(0..evict_count).collect();
            for k in to_evict {
                entries.remove(&k);
            }
        }
    }

    fn reset_for_tests(&self) {
        self.entries.lock().unwrap().clear();
        self.order.lock().unwrap().clear();
    }
}

/// The tenant registry, §4.C. One document per user in a single shared
/// registry database; all other per-user state lives in databases this
/// registry derives the names of but never owns itself.
pub struct UserRegistry {
    store: Arc<dyn DocumentStore>,
    prefix: String,
    registry_db: String,
    cache: LookupCache,
}

impl UserRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, config: &EddoConfig) -> Self {
        let prefix = config.prefix().to_string();
        let registry_db = eddo_core::naming::user_registry_database_name(&prefix);
        Self {
            store,
            prefix,
            registry_db,
            cache: LookupCache::new(),
        }
    }

    pub fn reset_cache_for_tests(&self) {
        self.cache.reset_for_tests();
    }

    #[instrument(skip(self))]
    pub async fn ensure_database(&self) -> Result<()> {
        self.store.ensure_db(&self.registry_db).await?;
        Ok(())
    }

    /// Installs `by_username`, `by_email`, `by_telegram_id`, `by_status`,
    /// and `active_users` views, retrying on conflict (handled inside
    /// `upsert_design_document_with_retry`, ≤10 tries, linear backoff).
    #[instrument(skip(self))]
    pub async fn setup_design_documents(&self) -> Result<()> {
        let doc = json!({
            "views": {
                "by_username": {
                    "map": "function (doc) { if (doc.username) emit(doc.username, null); }"
                },
                "by_email": {
                    "map": "function (doc) { if (doc.email) emit(doc.email, null); }"
                },
                "by_telegram_id": {
                    "map": "function (doc) { if (doc.telegram_id) emit(doc.telegram_id, null); }"
                },
                "by_status": {
                    "map": "function (doc) { if (doc.status) emit(doc.status, null); }"
                },
                "active_users": {
                    "map": "function (doc) { if (doc.status === 'active') emit(doc._id, null); }"
                }
            }
        });
        upsert_design_document_with_retry(self.store.as_ref(), &self.registry_db, "_design/users", doc)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_username(&self, username: &str) -> Result<Option<UserEntry>> {
        let sanitized = eddo_core::naming::sanitize_username(username);
        if let Some(cached_id) = self.cache.get(&sanitized) {
            if let Ok(Some(entry)) = self.get_by_id(&cached_id).await {
                return Ok(Some(entry));
            }
        }

        let docs = self
            .store
            .find(&self.registry_db, json!({"username": username}), FindOptions::default())
            .await?;
        let Some(doc) = docs.into_iter().next() else {
            return Ok(None);
        };
        let entry = self.migrate_on_read(doc).await?;
        self.cache.insert(sanitized, entry.id.clone());
        Ok(Some(entry))
    }

    #[instrument(skip(self))]
    pub async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<UserEntry>> {
        let cache_key = format!("tg:{telegram_id}");
        if let Some(cached_id) = self.cache.get(&cache_key) {
            if let Ok(Some(entry)) = self.get_by_id(&cached_id).await {
                return Ok(Some(entry));
            }
        }

        let docs = self
            .store
            .find(
                &self.registry_db,
                json!({"telegram_id": telegram_id}),
                FindOptions::default(),
            )
            .await?;
        let Some(doc) = docs.into_iter().next() else {
            return Ok(None);
        };
        let entry = self.migrate_on_read(doc).await?;
        self.cache.insert(cache_key, entry.id.clone());
        Ok(Some(entry))
    }

    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserEntry>> {
        let docs = self
            .store
            .find(&self.registry_db, json!({"email": email}), FindOptions::default())
            .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(Some(self.migrate_on_read(doc).await?)),
            None => Ok(None),
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<UserEntry>> {
        match self.store.get(&self.registry_db, id).await {
            Ok(doc) => Ok(Some(self.migrate_on_read(doc).await?)),
            Err(eddo_store::StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, new_user))]
    pub async fn create(&self, new_user: NewUser) -> Result<UserEntry> {
        let sanitized = eddo_core::naming::sanitize_username(&new_user.username);
        let id = format!("user_{sanitized}");

        if self.store.get(&self.registry_db, &id).await.is_ok() {
            return Err(UserError::AlreadyExists(new_user.username));
        }

        let now = Utc::now();
        let entry = UserEntry {
            id: id.clone(),
            rev: None,
            username: new_user.username,
            telegram_id: new_user.telegram_id,
            email: new_user.email,
            database_name: eddo_core::naming::user_database_name(&self.prefix, &sanitized),
            created_at: now,
            updated_at: now,
            permissions: vec![Permission::Read, Permission::Write],
            status: UserStatus::Active,
            preferences: Default::default(),
            version: "alpha2".to_string(),
        };

        let doc = serde_json::to_value(&entry).expect("UserEntry always serializes");
        let saved = self
            .store
            .insert(&self.registry_db, doc)
            .await
            .map_err(|e| match e {
                eddo_store::StoreError::Conflict(_) => UserError::AlreadyExists(entry.username.clone()),
                other => other.into(),
            })?;

        serde_json::from_value(saved).map_err(|e| UserError::Store(eddo_store::StoreError::Other(e.to_string())))
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: UserPatch) -> Result<UserEntry> {
        let doc = self.store.get(&self.registry_db, id).await?;
        let mut entry = self.migrate_on_read(doc).await?;

        if let Some(email) = patch.email {
            entry.email = email;
        }
        if let Some(status) = patch.status {
            entry.status = status;
        }
        if let Some(permissions) = patch.permissions {
            entry.permissions = permissions;
        }
        if let Some(preferences) = patch.preferences {
            entry.preferences = preferences;
        }
        entry.updated_at = Utc::now();

        let doc = serde_json::to_value(&entry).expect("UserEntry always serializes");
        let saved = self.store.insert(&self.registry_db, doc).await?;
        serde_json::from_value(saved).map_err(|e| UserError::Store(eddo_store::StoreError::Other(e.to_string())))
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<UserEntry>> {
        let docs = self.store.list(&self.registry_db, Default::default()).await?;
        let mut out = Vec::new();
        for doc in docs {
            if doc.get("_id").and_then(|v| v.as_str()).is_some_and(|id| id.starts_with("_design/")) {
                continue;
            }
            out.push(self.migrate_on_read(doc).await?);
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let doc = self.store.get(&self.registry_db, id).await?;
        let rev = doc
            .get("_rev")
            .and_then(|v| v.as_str())
            .ok_or_else(|| UserError::NotFound(id.to_string()))?;
        self.store.delete(&self.registry_db, id, rev).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn ensure_user_database(&self, username: &str) -> Result<()> {
        let sanitized = eddo_core::naming::sanitize_username(username);
        let db_name = eddo_core::naming::user_database_name(&self.prefix, &sanitized);
        self.store.ensure_db(&db_name).await?;
        Ok(())
    }

    /// Entries are already stored at the latest shape in this registry
    /// (there is no narrower predecessor format for user entries, unlike
    /// todos), so this is currently the identity function kept as the
    /// single seam §4.C's "migrates to latest version, then writes back"
    /// contract requires — a real predecessor shape would upgrade here and
    /// fire the write-back the same way `eddo_todo`'s version engine does.
    async fn migrate_on_read(&self, doc: serde_json::Value) -> Result<UserEntry> {
        let entry: UserEntry =
            serde_json::from_value(doc).map_err(|e| UserError::Store(eddo_store::StoreError::Other(e.to_string())))?;
        if entry.version != "alpha2" {
            let store = Arc::clone(&self.store);
            let db = self.registry_db.clone();
            let mut migrated = entry.clone();
            migrated.version = "alpha2".to_string();
            tokio::spawn(async move {
                let doc = serde_json::to_value(&migrated).expect("UserEntry always serializes");
                if let Err(e) = store.insert(&db, doc).await {
                    warn!(error = %e, "background user-entry migration write failed");
                } else {
                    debug!("migrated user entry to alpha2 in background");
                }
            });
        }
        Ok(entry)
    }
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

    #[tokio::test]
    async fn create_then_find_by_username() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let registry = UserRegistry::new(store, &test_config());

        let created = registry
            .create(NewUser {
                username: "Alice".to_string(),
                telegram_id: Some(42),
                email: None,
            })
            .await
            .unwrap();
        assert_eq!(created.id, "user_alice");
        assert_eq!(created.database_name, "eddo_test_user_alice");

        let found = registry.find_by_username("Alice").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let registry = UserRegistry::new(store, &test_config());

        registry
            .create(NewUser {
                username: "bob".to_string(),
                telegram_id: None,
                email: None,
            })
            .await
            .unwrap();

        let err = registry
            .create(NewUser {
                username: "Bob".to_string(), // sanitizes to the same id
                telegram_id: None,
                email: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_preserves_unset_fields() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let registry = UserRegistry::new(store, &test_config());
        let created = registry
            .create(NewUser {
                username: "carol".to_string(),
                telegram_id: None,
                email: Some("carol@example.com".to_string()),
            })
            .await
            .unwrap();

        let updated = registry
            .update(
                &created.id,
                UserPatch {
                    status: Some(UserStatus::Suspended),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, UserStatus::Suspended);
        assert_eq!(updated.email.as_deref(), Some("carol@example.com"));
    }
}
