//! The sync scheduler, §4.J / §5 / §9: a single long-lived task that, on
//! each tick, selects eligible users and fans out per-user syncs with
//! bounded concurrency.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eddo_core::ambient::EnsuredSet;
use eddo_core::config::{EddoConfig, DEFAULT_SYNC_CONCURRENCY};
use eddo_store::DocumentStore;
use eddo_users::UserRegistry;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use crate::sync::sync_user;
use crate::types::{SyncStats, UserSyncResult};

/// How often the scheduler checks for eligible users. Each user's own
/// `preferences.emailSyncInterval` gates whether *that* user is actually
/// due (§4.J); this is just the tick cadence of the outer loop.
const TICK_PERIOD_SECS: u64 = 60;

pub struct SyncScheduler {
    store: Arc<dyn DocumentStore>,
    config: EddoConfig,
    registry: Arc<UserRegistry>,
    index_ensured: Arc<EnsuredSet>,
    concurrency: usize,
}

impl SyncScheduler {
    pub fn new(store: Arc<dyn DocumentStore>, config: EddoConfig, registry: Arc<UserRegistry>) -> Self {
        Self {
            store,
            config,
            registry,
            index_ensured: Arc::new(EnsuredSet::new()),
            concurrency: DEFAULT_SYNC_CONCURRENCY,
        }
    }

    #[cfg(test)]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// One scheduler tick: collect eligible users eagerly, then fan out
    /// per-user syncs with bounded concurrency, honoring `shutdown` between
    /// starts (in-flight syncs are allowed to run to completion). A tick
    /// that finds zero eligible users performs zero writes (§8 property 8).
    pub async fn tick(&self, shutdown: &watch::Receiver<bool>) -> Vec<UserSyncResult> {
        let now = Utc::now();
        let eligible = match self.registry.list().await {
            Ok(entries) => entries.into_iter().filter(|e| e.is_eligible_for_sync(now)).collect::<Vec<_>>(),
            Err(e) => {
                error!(error = %e, "failed to list registry entries for sync tick");
                return Vec::new();
            }
        };

        if eligible.is_empty() {
            return Vec::new();
        }

        info!(count = eligible.len(), "starting per-user email syncs");
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::new();

        for entry in eligible {
            if *shutdown.borrow() {
                warn!("shutdown signaled; not starting further per-user syncs this tick");
                break;
            }

            let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore is never closed");
            let store = Arc::clone(&self.store);
            let config = self.config.clone();
            let registry = Arc::clone(&self.registry);
            let index_ensured = Arc::clone(&self.index_ensured);
            let username = entry.username.clone();

            let task = tokio::spawn(async move {
                let _permit = permit;
                let result = sync_user(store, &config, &registry, &entry, &index_ensured).await;
                match result {
                    Ok(stats) => UserSyncResult { username, stats },
                    Err(e) => {
                        warn!(user.name = %username, error = %e, "per-user sync failed");
                        UserSyncResult {
                            username,
                            stats: SyncStats {
                                errors: 1,
                                ..Default::default()
                            },
                        }
                    }
                }
            });
            tasks.push(task);
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "per-user sync task panicked"),
            }
        }
        results
    }

    /// Main loop: polls every `TICK_PERIOD_SECS` until `shutdown` broadcasts
    /// `true`. On shutdown, stops starting new ticks but does not abort a
    /// tick already in progress (§5).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("sync scheduler started");
        let mut interval = tokio::time::interval(Duration::from_secs(TICK_PERIOD_SECS));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let results = self.tick(&shutdown).await;
                    for result in &results {
                        info!(
                            user.name = %result.username,
                            fetched = result.stats.fetched,
                            created = result.stats.created,
                            skipped = result.stats.skipped,
                            errors = result.stats.errors,
                            "sync tick complete for user"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("sync scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eddo_store::memory::MemoryStore;
    use eddo_users::NewUser;

    fn test_config() -> EddoConfig {
        let mut config = EddoConfig::default();
        config.environment.node_env = "test".to_string();
        config
    }

    #[tokio::test]
    async fn tick_with_zero_eligible_users_performs_no_writes() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let config = test_config();
        let registry = Arc::new(UserRegistry::new(Arc::clone(&store), &config));
        registry.ensure_database().await.unwrap();
        registry
            .create(NewUser {
                username: "alice".to_string(),
                telegram_id: None,
                email: None,
            })
            .await
            .unwrap();

        let scheduler = SyncScheduler::new(store, config, registry);
        let (_tx, rx) = watch::channel(false);
        let results = scheduler.tick(&rx).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn shutdown_signal_stops_starting_new_syncs() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let config = test_config();
        let registry = Arc::new(UserRegistry::new(Arc::clone(&store), &config));
        registry.ensure_database().await.unwrap();

        for name in ["alice", "bob"] {
            let created = registry
                .create(NewUser {
                    username: name.to_string(),
                    telegram_id: None,
                    email: None,
                })
                .await
                .unwrap();
            registry
                .update(
                    &created.id,
                    eddo_users::UserPatch {
                        preferences: Some(eddo_users::UserPreferences {
                            email_sync: true,
                            email_config: Some(eddo_users::EmailConfig {
                                imap_host: "imap.example.com".to_string(),
                                imap_port: 993,
                                imap_user: Some(format!("{name}@example.com")),
                                imap_password: Some("secret".to_string()),
                                oauth_email: None,
                                oauth_refresh_token: None,
                                provider: eddo_users::EmailProvider::Plain,
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let scheduler = SyncScheduler::new(store, config, registry);
        let (tx, rx) = watch::channel(true);
        tx.send(true).unwrap();
        let results = scheduler.tick(&rx).await;
        assert!(results.is_empty());
    }
}
