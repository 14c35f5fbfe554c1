use std::sync::Arc;

use eddo_audit::AuditStore;
use eddo_auth::AuthSession;
use eddo_todo::TodoStore;
use eddo_users::UserRegistry;

/// Per-request context a tool executes against: the authenticated caller's
/// session plus the per-user stores it is authorized to operate on.
pub struct ToolContext {
    pub session: AuthSession,
    pub todos: TodoStore,
    pub audit: AuditStore,
    pub registry: Arc<UserRegistry>,
}

impl ToolContext {
    pub fn new(session: AuthSession, todos: TodoStore, audit: AuditStore, registry: Arc<UserRegistry>) -> Self {
        Self {
            session,
            todos,
            audit,
            registry,
        }
    }
}
