use opentelemetry::Context as OtelContext;

/// The result of the auth gate, §4.G. Carried alongside the W3C trace
/// context extracted from the same request so tool-execution spans can be
/// parented to the caller.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: String,
    pub db_name: String,
    pub username: String,
    pub telegram_id: Option<i64>,
}

impl AuthSession {
    pub const ANONYMOUS_USER_ID: &'static str = "anonymous";
    pub const ANONYMOUS_DB_NAME: &'static str = "default";

    pub fn anonymous() -> Self {
        Self {
            user_id: Self::ANONYMOUS_USER_ID.to_string(),
            db_name: Self::ANONYMOUS_DB_NAME.to_string(),
            username: Self::ANONYMOUS_USER_ID.to_string(),
            telegram_id: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id == Self::ANONYMOUS_USER_ID
    }
}

/// An `AuthSession` paired with the parent span context extracted from W3C
/// `traceparent`/`tracestate` headers, if any were present on the request.
#[derive(Clone)]
pub struct AuthenticatedRequest {
    pub session: AuthSession,
    pub parent_context: OtelContext,
}
