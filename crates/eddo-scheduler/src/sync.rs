//! Per-user email sync, §4.J steps 1-7.

use std::sync::Arc;

use chrono::Utc;
use eddo_core::ambient::EnsuredSet;
use eddo_core::config::EddoConfig;
use eddo_email::{fetch_emails, generate_external_id, map_email_to_todo, move_to_processed, refresh_access_token, ConnectionConfig};
use eddo_store::DocumentStore;
use eddo_todo::{MetadataValue, TodoPatch, TodoQuery, TodoStore};
use eddo_users::{EmailProvider, UserEntry, UserPatch, UserPreferences, UserRegistry};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::types::SyncStats;

/// Runs one user's sync: fetch unread mail, dedup by `externalId`, create
/// todos for new messages, move processed UIDs, and bump
/// `preferences.emailLastSync`. Per-message errors are counted, not
/// propagated — a single bad message does not abort the user's sync.
#[instrument(
    skip(store, config, registry, entry, index_ensured),
    fields(
        user.id = %entry.id,
        user.name = %entry.username,
        email.folder = tracing::field::Empty,
        email.provider = tracing::field::Empty,
    )
)]
pub async fn sync_user(
    store: Arc<dyn DocumentStore>,
    config: &EddoConfig,
    registry: &UserRegistry,
    entry: &UserEntry,
    index_ensured: &EnsuredSet,
) -> Result<SyncStats> {
    let mut stats = SyncStats::default();

    let preferences = entry.preferences.clone();
    let email_config = preferences
        .email_config
        .clone()
        .expect("is_eligible_for_sync already checked email_config is present");

    let folder = preferences.email_folder.clone();
    tracing::Span::current().record("email.folder", folder.as_str());
    tracing::Span::current().record(
        "email.provider",
        match email_config.provider {
            EmailProvider::Gmail => "gmail",
            EmailProvider::Plain => "plain",
        },
    );

    let access_token = match email_config.provider {
        EmailProvider::Gmail => {
            let client_id = config.oauth.google_client_id.as_deref().unwrap_or_default();
            let client_secret = config.oauth.google_client_secret.as_deref().unwrap_or_default();
            let refresh_token = email_config.oauth_refresh_token.as_deref().unwrap_or_default();
            let token = refresh_access_token(client_id, client_secret, refresh_token).await?;
            info!("refreshed gmail access token for sync");
            Some(token)
        }
        EmailProvider::Plain => None,
    };

    let (connection, access_token) = ConnectionConfig::from_preferences(&email_config, &folder, access_token.as_deref())?;

    let items = fetch_emails(&connection, access_token.as_deref()).await?;
    stats.fetched = items.len();
    if items.is_empty() {
        return Ok(stats);
    }

    let todos = TodoStore::new(Arc::clone(&store), config, &entry.username);
    todos.ensure_database().await?;
    if index_ensured.ensure(&entry.username) {
        todos.setup_indices().await?;
    }

    let default_tags = preferences.email_sync_tags.clone();
    let mut created_pairs = Vec::new();

    for item in &items {
        let external_id = generate_external_id(item);
        let existing = todos
            .list(TodoQuery {
                external_id: Some(external_id.clone()),
                ..Default::default()
            })
            .await?;

        if !existing.is_empty() {
            stats.skipped += 1;
            continue;
        }

        let new_todo = map_email_to_todo(item, default_tags.clone());
        match todos.create(new_todo).await {
            Ok(todo) => {
                stats.created += 1;
                created_pairs.push((item.uid, todo.id));
            }
            Err(e) => {
                warn!(uid = item.uid, error = %e, "failed to create todo for ingested message");
                stats.errors += 1;
            }
        }
    }

    if !created_pairs.is_empty() {
        let uids: Vec<u32> = created_pairs.iter().map(|(uid, _)| *uid).collect();
        match move_to_processed(&connection, access_token.as_deref(), &uids).await {
            Ok(result) => {
                for (uid, todo_id) in &created_pairs {
                    if result.moved.contains(uid) {
                        mark_moved(&todos, todo_id).await;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "moving processed messages failed; todos remain created");
            }
        }
    }

    let updated_preferences = UserPreferences {
        email_last_sync: Some(Utc::now()),
        ..preferences
    };
    registry
        .update(
            &entry.id,
            UserPatch {
                preferences: Some(updated_preferences),
                ..Default::default()
            },
        )
        .await?;

    Ok(stats)
}

/// Best-effort: a failure to patch the `moved` marker is logged, not
/// counted as an ingestion error (§4.J step 6).
async fn mark_moved(todos: &TodoStore, todo_id: &str) {
    let Ok(existing) = todos.get(todo_id).await else {
        return;
    };
    let mut metadata = existing.metadata;
    metadata.insert("moved".to_string(), MetadataValue::Single("true".to_string()));
    if let Err(e) = todos
        .update(
            todo_id,
            TodoPatch {
                metadata: Some(metadata),
                ..Default::default()
            },
        )
        .await
    {
        warn!(todo_id, error = %e, "failed to patch moved marker onto ingested todo");
    }
}
