use std::sync::Arc;

use eddo_auth::AuthGate;
use eddo_core::ambient::EnsuredSet;
use eddo_core::config::EddoConfig;
use eddo_store::DocumentStore;
use eddo_tools::ToolRegistry;
use eddo_users::UserRegistry;

/// Central shared state for the tool server, passed as `Arc<AppState>` to
/// every axum handler — the same composition-root shape the gateway binary
/// this workspace started from uses for its own `AppState`.
pub struct AppState {
    pub config: EddoConfig,
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<UserRegistry>,
    pub auth: AuthGate,
    pub tools: ToolRegistry,
    pub audit_index_ensured: Arc<EnsuredSet>,
}

impl AppState {
    pub fn new(config: EddoConfig, store: Arc<dyn DocumentStore>, registry: Arc<UserRegistry>) -> Self {
        let auth = AuthGate::new(Arc::clone(&registry));
        Self {
            config,
            store,
            registry,
            auth,
            tools: ToolRegistry::new(),
            audit_index_ensured: Arc::new(EnsuredSet::new()),
        }
    }
}

fn cors_layer(config: &EddoConfig) -> tower_http::cors::CorsLayer {
    use tower_http::cors::{AllowOrigin, CorsLayer};

    let origin = config.server.cors_origin.as_str();
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        match http::HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => AllowOrigin::any(),
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([
            http::header::CONTENT_TYPE,
            http::HeaderName::from_static("x-user-id"),
            http::HeaderName::from_static("x-database-name"),
            http::HeaderName::from_static("x-telegram-id"),
            http::HeaderName::from_static("traceparent"),
            http::HeaderName::from_static("tracestate"),
        ])
}

/// Assemble the full Axum router: `/mcp` for tool invocation, `/health` for
/// liveness, wrapped in the standard `tower-http` trace layer.
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::{get, post};

    let cors = cors_layer(&state.config);

    axum::Router::new()
        .route("/health", get(crate::health::health_handler))
        .route("/mcp", post(crate::mcp::mcp_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
}
