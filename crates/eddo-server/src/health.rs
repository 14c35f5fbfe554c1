use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health — liveness probe. Does not touch the document store; a
/// readiness check that actually reaches CouchDB is left to deployment
/// tooling (out of scope per §1).
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "environment": match state.config.node_environment() {
            eddo_core::naming::Environment::Production => "production",
            eddo_core::naming::Environment::Test => "test",
        },
        "databasePrefix": state.config.prefix(),
    }))
}
