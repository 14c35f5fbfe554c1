//! The tool server's streaming HTTP transport, §4.H / §6.
//!
//! One session per connection; each tool call is one request/response. The
//! server may additionally emit log notifications on the same stream ahead
//! of the final result — modeled here as newline-delimited JSON (NDJSON)
//! frames, the networked generalization of the teacher's stdio-framed
//! `mcp_bridge::run` JSON-RPC dispatch.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use eddo_audit::AuditStore;
use eddo_todo::TodoStore;
use eddo_tools::ToolContext;
use futures_util::stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct McpRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub tool: String,
    #[serde(default)]
    pub params: Value,
}

/// POST /mcp — authenticates via [`eddo_auth::AuthGate`], dispatches the
/// named tool through the [`eddo_tools::ToolRegistry`], and streams back a
/// `{"type":"notification",...}` frame followed by a single
/// `{"type":"result",...}` frame.
#[instrument(skip(state, headers, body), fields(tool = tracing::field::Empty))]
pub async fn mcp_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let request: McpRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("malformed request body: {e}")})),
            )
                .into_response()
        }
    };
    tracing::Span::current().record("tool", request.tool.as_str());

    let authenticated = match state.auth.authenticate(&headers).await {
        Ok(request) => request,
        Err(e) => {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": e.to_string()}))).into_response();
        }
    };

    let session = authenticated.session.clone();
    let todos = TodoStore::new(Arc::clone(&state.store), &state.config, &session.username);
    let audit = AuditStore::new(
        Arc::clone(&state.store),
        &state.config,
        &session.username,
        Arc::clone(&state.audit_index_ensured),
    );
    let ctx = ToolContext::new(session, todos, audit, Arc::clone(&state.registry));

    let notification = json!({
        "type": "notification",
        "level": "info",
        "message": format!("dispatching {}", request.tool),
    });

    let envelope = state.tools.execute(&ctx, &request.tool, request.params).await;
    let result = json!({
        "type": "result",
        "id": request.id,
        "envelope": envelope,
    });

    let mut notification_line = serde_json::to_vec(&notification).unwrap_or_default();
    notification_line.push(b'\n');
    let mut result_line = serde_json::to_vec(&result).unwrap_or_default();
    result_line.push(b'\n');

    let body = Body::from_stream(stream::iter([
        Ok::<_, std::io::Error>(axum::body::Bytes::from(notification_line)),
        Ok(axum::body::Bytes::from(result_line)),
    ]));

    Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eddo_auth::AuthGate;
    use eddo_core::config::EddoConfig;
    use eddo_store::memory::MemoryStore;
    use eddo_tools::ToolRegistry;
    use eddo_users::{NewUser, UserRegistry};

    async fn state_with_user() -> (Arc<AppState>, String) {
        let store: Arc<dyn eddo_store::DocumentStore> = Arc::new(MemoryStore::new());
        let config = EddoConfig::default();
        let registry = Arc::new(UserRegistry::new(Arc::clone(&store), &config));
        registry.ensure_database().await.unwrap();
        let entry = registry
            .create(NewUser {
                username: "alice".to_string(),
                telegram_id: None,
                email: None,
            })
            .await
            .unwrap();

        let state = Arc::new(AppState {
            auth: AuthGate::new(Arc::clone(&registry)),
            tools: ToolRegistry::new(),
            audit_index_ensured: Arc::new(eddo_core::ambient::EnsuredSet::new()),
            config,
            store,
            registry,
        });
        (state, entry.username)
    }

    #[tokio::test]
    async fn anonymous_request_is_rejected_with_success_envelope() {
        let (state, _) = state_with_user().await;
        let body = serde_json::to_vec(&json!({"tool": "createTodo", "params": {"title": "x"}})).unwrap();
        let response = mcp_handler(State(state), HeaderMap::new(), axum::body::Bytes::from(body)).await;
        // Anonymous sessions are authenticated (handshake allowed) but every
        // tool invocation fails inside the envelope, §4.G / §8 property 9.
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_before_authentication() {
        let (state, _) = state_with_user().await;
        let response = mcp_handler(State(state), HeaderMap::new(), axum::body::Bytes::from_static(b"not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
