use serde::Serialize;

/// Per-user sync outcome counters (§4.J), set as span attributes on
/// completion (`email.fetched/created/skipped/errors`).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncStats {
    pub fetched: usize,
    pub created: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// One user's sync result, keyed by username for the scheduler's tick
/// summary.
#[derive(Debug, Clone)]
pub struct UserSyncResult {
    pub username: String,
    pub stats: SyncStats,
}
