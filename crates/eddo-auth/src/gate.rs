use std::sync::{Arc, Weak};

use dashmap::DashMap;
use eddo_users::{UserRegistry, UserStatus};
use http::HeaderMap;
use opentelemetry::global;
use opentelemetry_http::HeaderExtractor;
use tracing::instrument;

use crate::error::{AuthError, Result};
use crate::types::{AuthSession, AuthenticatedRequest};

const USER_ID_HEADER: &str = "x-user-id";
const DATABASE_NAME_HEADER: &str = "x-database-name";
const TELEGRAM_ID_HEADER: &str = "x-telegram-id";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Stateless; runs on every request (§4.G). Holds only the weak session
/// mapping and a handle to the tenant registry for lookups.
pub struct AuthGate {
    registry: Arc<UserRegistry>,
    /// Keyed by `userId`, weakly so tool-execution wrappers can recover the
    /// parent trace context of an in-flight request without keeping it
    /// alive past the request's own lifetime.
    sessions: DashMap<String, Weak<AuthenticatedRequest>>,
}

impl AuthGate {
    pub fn new(registry: Arc<UserRegistry>) -> Self {
        Self {
            registry,
            sessions: DashMap::new(),
        }
    }

    /// Extracts `X-User-ID` / `X-Database-Name` / `X-Telegram-ID` (case
    /// insensitive) and the W3C trace-context headers, resolves the user in
    /// the registry (by username, with Telegram id fallback), and returns
    /// the resulting session wrapped alongside the parent span context.
    ///
    /// Absent `X-User-ID` yields the anonymous session rather than an
    /// error, so a connection handshake can proceed; any subsequent tool
    /// invocation under that session must be rejected by the caller.
    #[instrument(skip(self, headers))]
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Arc<AuthenticatedRequest>> {
        let parent_context = global::get_text_map_propagator(|propagator| {
            propagator.extract(&HeaderExtractor(headers))
        });

        let Some(user_id) = header_str(headers, USER_ID_HEADER) else {
            let request = Arc::new(AuthenticatedRequest {
                session: AuthSession::anonymous(),
                parent_context,
            });
            return Ok(request);
        };

        let telegram_id = header_str(headers, TELEGRAM_ID_HEADER).and_then(|v| v.parse::<i64>().ok());
        let requested_db = header_str(headers, DATABASE_NAME_HEADER).map(|s| s.to_string());

        let entry = match self.registry.find_by_username(user_id).await? {
            Some(entry) => entry,
            None => match telegram_id {
                Some(tg) => self
                    .registry
                    .find_by_telegram_id(tg)
                    .await?
                    .ok_or_else(|| AuthError::Unauthorized(user_id.to_string()))?,
                None => return Err(AuthError::Unauthorized(user_id.to_string())),
            },
        };

        if entry.status != UserStatus::Active {
            return Err(AuthError::Unauthorized(user_id.to_string()));
        }

        let session = AuthSession {
            user_id: entry.id.clone(),
            db_name: requested_db.unwrap_or_else(|| entry.database_name.clone()),
            username: entry.username.clone(),
            telegram_id: entry.telegram_id,
        };

        let request = Arc::new(AuthenticatedRequest { session, parent_context });
        self.sessions.insert(request.session.user_id.clone(), Arc::downgrade(&request));
        Ok(request)
    }

    /// Recovers a previously authenticated request's parent trace context
    /// by `userId`, if the originating request is still in flight.
    pub fn recover(&self, user_id: &str) -> Option<Arc<AuthenticatedRequest>> {
        self.sessions.get(user_id).and_then(|entry| entry.upgrade())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eddo_core::config::EddoConfig;
    use eddo_store::memory::MemoryStore;
    use eddo_users::NewUser;
    use http::HeaderValue;

    async fn gate_with_user() -> (AuthGate, eddo_users::UserEntry) {
        let memory: Arc<dyn eddo_store::DocumentStore> = Arc::new(MemoryStore::new());
        let registry = Arc::new(UserRegistry::new(memory, &EddoConfig::default()));
        registry.ensure_database().await.unwrap();
        let entry = registry
            .create(NewUser {
                username: "alice".to_string(),
                telegram_id: Some(42),
                email: None,
            })
            .await
            .unwrap();
        (AuthGate::new(registry), entry)
    }

    #[tokio::test]
    async fn missing_user_id_yields_anonymous_session() {
        let (gate, _) = gate_with_user().await;
        let request = gate.authenticate(&HeaderMap::new()).await.unwrap();
        assert!(request.session.is_anonymous());
    }

    #[tokio::test]
    async fn known_username_resolves_to_registry_entry() {
        let (gate, entry) = gate_with_user().await;
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("alice"));
        let request = gate.authenticate(&headers).await.unwrap();
        assert_eq!(request.session.username, "alice");
        assert_eq!(request.session.user_id, entry.id);
    }

    #[tokio::test]
    async fn telegram_id_fallback_resolves_when_username_unknown() {
        let (gate, entry) = gate_with_user().await;
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-real-username"));
        headers.insert(TELEGRAM_ID_HEADER, HeaderValue::from_static("42"));
        let request = gate.authenticate(&headers).await.unwrap();
        assert_eq!(request.session.user_id, entry.id);
    }

    #[tokio::test]
    async fn suspended_user_is_unauthorized() {
        let (gate, entry) = gate_with_user().await;
        gate.registry
            .update(
                &entry.id,
                eddo_users::UserPatch {
                    status: Some(eddo_users::UserStatus::Suspended),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("alice"));
        assert!(matches!(gate.authenticate(&headers).await, Err(AuthError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn unknown_user_id_is_unauthorized() {
        let (gate, _) = gate_with_user().await;
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("ghost"));
        assert!(matches!(gate.authenticate(&headers).await, Err(AuthError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn recover_returns_none_once_request_is_dropped() {
        let (gate, _) = gate_with_user().await;
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("alice"));
        let request = gate.authenticate(&headers).await.unwrap();
        let user_id = request.session.user_id.clone();
        assert!(gate.recover(&user_id).is_some());
        drop(request);
        assert!(gate.recover(&user_id).is_none());
    }
}
