//! Dispatch by tool name with span wrapping, §4.H / §9.

use std::collections::HashMap;

use chrono::Utc;
use eddo_core::CoreError;
use serde_json::Value;
use tracing::{field, Instrument};

use crate::catalog::{self, Tool};
use crate::context::ToolContext;
use crate::envelope::{self, Envelope};

pub struct ToolRegistry {
    tools: HashMap<&'static str, Box<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        let tools = catalog::catalog().into_iter().map(|t| (t.name(), t)).collect();
        Self { tools }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub fn schema_for(&self, name: &str) -> Option<Value> {
        self.tools.get(name).map(|t| t.input_schema())
    }

    /// Executes `name` against `ctx`, wrapped in a span parented to the
    /// caller's extracted trace context and annotated with `mcp.tool`,
    /// `user.id`, `user.name`. The anonymous session may not invoke any
    /// tool (§4.G, §8 property 9); every other outcome — success or
    /// failure — is returned as an envelope, never as a Rust `Err`.
    pub async fn execute(&self, ctx: &ToolContext, name: &str, input: Value) -> Envelope {
        let started = Utc::now();

        let span = tracing::info_span!(
            "mcp.tool",
            "mcp.tool" = name,
            "user.id" = %ctx.session.user_id,
            "user.name" = %ctx.session.username,
            outcome = field::Empty,
        );

        async move {
            if ctx.session.is_anonymous() {
                let error = CoreError::Unauthorized("anonymous session cannot invoke tools".to_string());
                tracing::Span::current().record("outcome", "auth_error");
                return envelope::failure(name, &error, started);
            }

            let Some(tool) = self.tools.get(name) else {
                let error = CoreError::Validation(format!("unknown tool: {name}"));
                tracing::Span::current().record("outcome", "validation_error");
                return envelope::failure(name, &error, started);
            };

            match tool.execute(ctx, input).await {
                Ok(outcome) => {
                    tracing::Span::current().record("outcome", "success");
                    envelope::success(name, outcome.summary, outcome.data, started)
                }
                Err(error) => {
                    tracing::Span::current().record("outcome", error.error_type());
                    envelope::failure(name, &error, started)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eddo_audit::AuditStore;
    use eddo_auth::AuthSession;
    use eddo_core::ambient::EnsuredSet;
    use eddo_core::config::EddoConfig;
    use eddo_store::{memory::MemoryStore, DocumentStore};
    use eddo_todo::TodoStore;
    use eddo_users::UserRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx(session: AuthSession) -> ToolContext {
        let memory: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let config = EddoConfig::default();
        let todos = TodoStore::new(memory.clone(), &config, &session.username);
        let audit = AuditStore::new(memory.clone(), &config, &session.username, Arc::new(EnsuredSet::new()));
        let registry = Arc::new(UserRegistry::new(memory, &config));
        ToolContext::new(session, todos, audit, registry)
    }

    #[tokio::test]
    async fn anonymous_session_cannot_invoke_any_tool() {
        let registry = ToolRegistry::new();
        let context = ctx(AuthSession::anonymous());
        let envelope = registry.execute(&context, "createTodo", json!({"title": "x"})).await;
        match envelope {
            Envelope::Failure(f) => assert_eq!(f.metadata["error_type"], "auth_error"),
            Envelope::Success(_) => panic!("expected failure envelope"),
        }
    }

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let registry = ToolRegistry::new();
        let session = AuthSession {
            user_id: "user_alice".to_string(),
            db_name: "default".to_string(),
            username: "alice".to_string(),
            telegram_id: None,
        };
        let context = ctx(session);

        let created = registry
            .execute(&context, "createTodo", json!({"title": "Buy milk", "context": "errands"}))
            .await;
        let Envelope::Success(created) = created else { panic!("expected success") };
        assert_eq!(created.data["todo"]["title"], "Buy milk");

        let listed = registry.execute(&context, "listTodos", json!({"context": "errands"})).await;
        let Envelope::Success(listed) = listed else { panic!("expected success") };
        assert_eq!(listed.data["pagination"]["count"], 1);
    }

    #[tokio::test]
    async fn create_todo_fans_out_an_audit_entry() {
        let registry = ToolRegistry::new();
        let session = AuthSession {
            user_id: "user_dana".to_string(),
            db_name: "default".to_string(),
            username: "dana".to_string(),
            telegram_id: None,
        };
        let context = ctx(session);

        let created = registry.execute(&context, "createTodo", json!({"title": "Buy milk"})).await;
        let Envelope::Success(created) = created else { panic!("expected success") };
        let todo_id = created.data["id"].as_str().unwrap().to_string();

        let audited = context
            .audit
            .list(eddo_audit::ListOptions::default())
            .await
            .unwrap();
        assert_eq!(audited.entries.len(), 1);
        assert_eq!(audited.entries[0].entity_id, todo_id);
        assert_eq!(audited.entries[0].source, eddo_audit::AuditSource::Mcp);
    }

    #[tokio::test]
    async fn combining_completed_false_with_completed_range_is_rejected() {
        let registry = ToolRegistry::new();
        let session = AuthSession {
            user_id: "user_bob".to_string(),
            db_name: "default".to_string(),
            username: "bob".to_string(),
            telegram_id: None,
        };
        let context = ctx(session);

        let result = registry
            .execute(
                &context,
                "listTodos",
                json!({"completed": false, "completedFrom": "2026-01-01T00:00:00Z"}),
            )
            .await;
        match result {
            Envelope::Failure(f) => assert_eq!(f.metadata["error_type"], "validation_error"),
            Envelope::Success(_) => panic!("expected failure envelope"),
        }
    }
}
