//! The fixed tool catalog, §4.H / §9. Each tool is a `{name, description,
//! paramsSchema, execute}` sum-type member; the server iterates the
//! registry and dispatches by name, exactly as the upstream source's
//! object-per-tool shape but expressed as a closed enum-free trait object
//! catalog.

use async_trait::async_trait;
use chrono::Utc;
use eddo_audit::{AuditAction, AuditEntry, AuditSource};
use eddo_core::CoreError;
use eddo_todo::{CompletionFilter, NewTodo, TodoQuery};
use serde_json::{json, Value};
use tracing::warn;

use crate::context::ToolContext;
use crate::params::{CreateTodoParams, IdParams, ListTodosParams, ServerInfoParams, ToggleCompletionParams};
use crate::patch::{parse_todo_patch, UpdateTodoParams};

fn parse<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, CoreError> {
    serde_json::from_value(input).map_err(|e| CoreError::Validation(e.to_string()))
}

/// Fans an audit entry out alongside the primary write (§2, §4.D). Best
/// effort per §9's open question: a failure here is logged, never
/// surfaced — the primary write already succeeded by the time this runs.
async fn record_audit(
    ctx: &ToolContext,
    action: AuditAction,
    entity_id: impl Into<String>,
    before: Option<Value>,
    after: Option<Value>,
) {
    let entity_id = entity_id.into();
    if let Err(e) = ctx.audit.ensure_database().await {
        warn!(error = %e, entity_id, "failed to ensure audit database for best-effort audit write");
        return;
    }
    let entry = AuditEntry::new(action, entity_id.clone(), AuditSource::Mcp, before, after);
    if let Err(e) = ctx.audit.insert(entry).await {
        warn!(error = %e, entity_id, "best-effort audit write failed");
    }
}

pub struct ToolOutcome {
    pub summary: String,
    pub data: Value,
}

impl ToolOutcome {
    pub fn new(summary: impl Into<String>, data: Value) -> Self {
        Self {
            summary: summary.into(),
            data,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, CoreError>;
}

pub struct CreateTodoTool;

#[async_trait]
impl Tool for CreateTodoTool {
    fn name(&self) -> &'static str {
        "createTodo"
    }

    fn description(&self) -> &'static str {
        "Creates a new todo. `due` defaults to end-of-current-day UTC when absent."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "description": {"type": "string"},
                "context": {"type": "string"},
                "due": {"type": "string", "format": "date-time"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "repeat": {"type": "integer"},
                "link": {"type": "string"},
                "externalId": {"type": "string"},
                "metadata": {"type": "object"}
            },
            "required": ["title"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, CoreError> {
        let params: CreateTodoParams = parse(input)?;
        ctx.todos.ensure_database().await?;
        let todo = ctx
            .todos
            .create(NewTodo {
                title: params.title,
                description: params.description,
                context: params.context,
                due: params.due,
                tags: params.tags,
                repeat: params.repeat,
                link: params.link,
                external_id: params.external_id,
                metadata: params.metadata,
            })
            .await?;
        let snapshot = serde_json::to_value(&todo).expect("Todo always serializes");
        record_audit(ctx, AuditAction::Create, todo.id.clone(), None, Some(snapshot)).await;
        Ok(ToolOutcome::new(
            format!("created todo {}", todo.id),
            json!({"id": todo.id, "todo": todo}),
        ))
    }
}

pub struct ListTodosTool;

/// Rejects a completion date range combined with `completed: false` — the
/// predicate is a single selector and the two cannot co-occur (§4.E, §7).
fn build_query(params: ListTodosParams) -> Result<TodoQuery, CoreError> {
    let has_completion_range = params.completed_from.is_some() || params.completed_to.is_some();

    let completion = if has_completion_range {
        if params.completed == Some(false) {
            return Err(CoreError::Validation(
                "completedFrom/completedTo cannot be combined with completed: false".to_string(),
            ));
        }
        Some(CompletionFilter::CompletedWithin {
            from: params.completed_from,
            to: params.completed_to,
        })
    } else {
        params.completed.map(|c| {
            if c {
                CompletionFilter::Completed
            } else {
                CompletionFilter::NotCompleted
            }
        })
    };

    Ok(TodoQuery {
        context: params.context,
        completion,
        due_from: params.date_from,
        due_to: params.date_to,
        tags: params.tags,
        external_id: params.external_id,
        limit: params.limit,
    })
}

#[async_trait]
impl Tool for ListTodosTool {
    fn name(&self) -> &'static str {
        "listTodos"
    }

    fn description(&self) -> &'static str {
        "Lists todos matching the given filters. A missing per-user database yields an empty result, not an error."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "context": {"type": "string"},
                "completed": {"type": "boolean"},
                "dateFrom": {"type": "string", "format": "date-time"},
                "dateTo": {"type": "string", "format": "date-time"},
                "completedFrom": {"type": "string", "format": "date-time"},
                "completedTo": {"type": "string", "format": "date-time"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "externalId": {"type": "string"},
                "limit": {"type": "integer"}
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, CoreError> {
        let params: ListTodosParams = parse(input)?;
        let limit = params.limit;
        let applied_filters = json!({
            "context": params.context,
            "completed": params.completed,
            "dateFrom": params.date_from,
            "dateTo": params.date_to,
            "completedFrom": params.completed_from,
            "completedTo": params.completed_to,
            "tags": params.tags,
            "externalId": params.external_id,
        });
        let query = build_query(params)?;
        let todos = ctx.todos.list(query).await?;
        let count = todos.len();
        let has_more = limit.is_some_and(|l| count >= l);
        Ok(ToolOutcome::new(
            format!("found {count} todo(s)"),
            json!({
                "todos": todos,
                "pagination": {"count": count, "limit": limit, "has_more": has_more},
                "filters": applied_filters,
            }),
        ))
    }
}

pub struct GetTodoTool;

#[async_trait]
impl Tool for GetTodoTool {
    fn name(&self) -> &'static str {
        "getTodo"
    }

    fn description(&self) -> &'static str {
        "Reads a single todo by id."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]})
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, CoreError> {
        let params: IdParams = parse(input)?;
        let todo = ctx.todos.get(&params.id).await?;
        Ok(ToolOutcome::new(format!("fetched todo {}", todo.id), json!({"todo": todo})))
    }
}

pub struct UpdateTodoTool;

#[async_trait]
impl Tool for UpdateTodoTool {
    fn name(&self) -> &'static str {
        "updateTodo"
    }

    fn description(&self) -> &'static str {
        "Read-modify-write update. Fields absent from `patch` are preserved; explicit `null` clears a nullable field."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"id": {"type": "string"}, "patch": {"type": "object"}},
            "required": ["id", "patch"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, CoreError> {
        let params: UpdateTodoParams = parse(input)?;
        let patch = parse_todo_patch(&params.patch)?;
        let before = ctx.todos.get(&params.id).await.ok().map(|t| serde_json::to_value(&t).expect("Todo always serializes"));
        let todo = ctx.todos.update(&params.id, patch).await?;
        let after = serde_json::to_value(&todo).expect("Todo always serializes");
        record_audit(ctx, AuditAction::Update, todo.id.clone(), before, Some(after)).await;
        Ok(ToolOutcome::new(format!("updated todo {}", todo.id), json!({"todo": todo})))
    }
}

pub struct ToggleTodoCompletionTool;

#[async_trait]
impl Tool for ToggleTodoCompletionTool {
    fn name(&self) -> &'static str {
        "toggleTodoCompletion"
    }

    fn description(&self) -> &'static str {
        "Marks a todo completed or open, applying the repeat-on-completion policy when it transitions to completed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"id": {"type": "string"}, "completed": {"type": "boolean"}},
            "required": ["id", "completed"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, CoreError> {
        let params: ToggleCompletionParams = parse(input)?;
        let result = ctx.todos.toggle_completion(&params.id, params.completed).await?;
        let repeat_type = result.repeat_anchor.map(|a| match a {
            eddo_todo::repeat::RepeatAnchor::Calendar => "calendar",
            eddo_todo::repeat::RepeatAnchor::Habit => "habit",
        });
        let action = if params.completed { AuditAction::Complete } else { AuditAction::Uncomplete };
        let after = serde_json::to_value(&result.todo).expect("Todo always serializes");
        record_audit(ctx, action, result.todo.id.clone(), None, Some(after)).await;
        if let Some(successor) = &result.successor {
            let successor_snapshot = serde_json::to_value(successor).expect("Todo always serializes");
            record_audit(ctx, AuditAction::Create, successor.id.clone(), None, Some(successor_snapshot)).await;
        }
        Ok(ToolOutcome::new(
            format!("toggled completion for todo {}", result.todo.id),
            json!({
                "todo": result.todo,
                "successor": result.successor,
                "repeat_type": repeat_type,
                "new_due_date": result.new_due_date,
            }),
        ))
    }
}

pub struct DeleteTodoTool;

#[async_trait]
impl Tool for DeleteTodoTool {
    fn name(&self) -> &'static str {
        "deleteTodo"
    }

    fn description(&self) -> &'static str {
        "Deletes a todo by id."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]})
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, CoreError> {
        let params: IdParams = parse(input)?;
        let before = ctx.todos.get(&params.id).await.ok().map(|t| serde_json::to_value(&t).expect("Todo always serializes"));
        ctx.todos.delete(&params.id).await?;
        record_audit(ctx, AuditAction::Delete, params.id.clone(), before, None).await;
        Ok(ToolOutcome::new(format!("deleted todo {}", params.id), json!({"id": params.id})))
    }
}

pub struct StartTimeTrackingTool;

#[async_trait]
impl Tool for StartTimeTrackingTool {
    fn name(&self) -> &'static str {
        "startTimeTracking"
    }

    fn description(&self) -> &'static str {
        "Starts a time-tracking session on a todo. Rejected if one is already running."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]})
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, CoreError> {
        let params: IdParams = parse(input)?;
        let todo = ctx.todos.start_time_tracking(&params.id).await?;
        let after = serde_json::to_value(&todo).expect("Todo always serializes");
        record_audit(ctx, AuditAction::TimeTrackingStart, todo.id.clone(), None, Some(after)).await;
        Ok(ToolOutcome::new(format!("started time tracking on {}", todo.id), json!({"todo": todo})))
    }
}

pub struct StopTimeTrackingTool;

#[async_trait]
impl Tool for StopTimeTrackingTool {
    fn name(&self) -> &'static str {
        "stopTimeTracking"
    }

    fn description(&self) -> &'static str {
        "Stops the running time-tracking session on a todo. A no-op error when none is running."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]})
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, CoreError> {
        let params: IdParams = parse(input)?;
        let todo = ctx.todos.stop_time_tracking(&params.id).await?;
        let after = serde_json::to_value(&todo).expect("Todo always serializes");
        record_audit(ctx, AuditAction::TimeTrackingStop, todo.id.clone(), None, Some(after)).await;
        Ok(ToolOutcome::new(format!("stopped time tracking on {}", todo.id), json!({"todo": todo})))
    }
}

pub struct GetActiveTimeTrackingTool;

#[async_trait]
impl Tool for GetActiveTimeTrackingTool {
    fn name(&self) -> &'static str {
        "getActiveTimeTracking"
    }

    fn description(&self) -> &'static str {
        "Lists todos with a currently running time-tracking session."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: Value) -> Result<ToolOutcome, CoreError> {
        let todos = ctx.todos.active_time_tracking().await?;
        Ok(ToolOutcome::new(
            format!("{} active session(s)", todos.len()),
            json!({"todos": todos, "active_session_count": todos.len()}),
        ))
    }
}

pub struct GetUserInfoTool;

#[async_trait]
impl Tool for GetUserInfoTool {
    fn name(&self) -> &'static str {
        "getUserInfo"
    }

    fn description(&self) -> &'static str {
        "Returns the authenticated caller's registry entry."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: Value) -> Result<ToolOutcome, CoreError> {
        let entry = ctx
            .registry
            .find_by_username(&ctx.session.username)
            .await?
            .ok_or_else(|| CoreError::NotFound(ctx.session.username.clone()))?;
        Ok(ToolOutcome::new(format!("fetched user info for {}", entry.username), json!({"user": entry})))
    }
}

pub struct GetServerInfoTool;

#[async_trait]
impl Tool for GetServerInfoTool {
    fn name(&self) -> &'static str {
        "getServerInfo"
    }

    fn description(&self) -> &'static str {
        "Introspection: aggregate tag statistics and a digest of memory todos (`user:memory`)."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"section": {"type": "string"}}})
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, CoreError> {
        let params: ServerInfoParams = parse(input)?;
        let todos = ctx.todos.list(TodoQuery::default()).await?;

        let mut tag_counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for todo in &todos {
            for tag in &todo.tags {
                *tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        let memories: Vec<_> = todos
            .iter()
            .filter(|t| t.tags.iter().any(|tag| tag == "user:memory"))
            .map(|t| json!({"id": t.id, "title": t.title, "description": t.description}))
            .collect();

        Ok(ToolOutcome::new(
            "server info",
            json!({
                "section": params.section,
                "tag_statistics": tag_counts,
                "memories": memories,
            }),
        ))
    }
}

pub struct GetBriefingDataTool;

#[async_trait]
impl Tool for GetBriefingDataTool {
    fn name(&self) -> &'static str {
        "getBriefingData"
    }

    fn description(&self) -> &'static str {
        "Read-only aggregation: open todos due today or earlier, and todos with a running time-tracking session."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: Value) -> Result<ToolOutcome, CoreError> {
        let now = Utc::now();
        let due = ctx
            .todos
            .list(TodoQuery {
                completion: Some(CompletionFilter::NotCompleted),
                due_to: Some(now),
                ..Default::default()
            })
            .await?;
        let active = ctx.todos.active_time_tracking().await?;
        Ok(ToolOutcome::new(
            format!("{} todo(s) due, {} active session(s)", due.len(), active.len()),
            json!({"due": due, "active_time_tracking": active}),
        ))
    }
}

pub struct GetRecapDataTool;

#[async_trait]
impl Tool for GetRecapDataTool {
    fn name(&self) -> &'static str {
        "getRecapData"
    }

    fn description(&self) -> &'static str {
        "Read-only aggregation: todos completed in the last 24 hours."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, ctx: &ToolContext, _input: Value) -> Result<ToolOutcome, CoreError> {
        let now = Utc::now();
        let since = now - chrono::Duration::hours(24);
        let completed = ctx
            .todos
            .list(TodoQuery {
                completion: Some(CompletionFilter::CompletedWithin {
                    from: Some(since),
                    to: Some(now),
                }),
                ..Default::default()
            })
            .await?;
        Ok(ToolOutcome::new(
            format!("{} todo(s) completed in the last 24h", completed.len()),
            json!({"completed": completed}),
        ))
    }
}

/// The fixed catalog, in the order §4.H lists them.
pub fn catalog() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(CreateTodoTool),
        Box::new(ListTodosTool),
        Box::new(GetTodoTool),
        Box::new(UpdateTodoTool),
        Box::new(ToggleTodoCompletionTool),
        Box::new(DeleteTodoTool),
        Box::new(StartTimeTrackingTool),
        Box::new(StopTimeTrackingTool),
        Box::new(GetActiveTimeTrackingTool),
        Box::new(GetUserInfoTool),
        Box::new(GetServerInfoTool),
        Box::new(GetBriefingDataTool),
        Box::new(GetRecapDataTool),
    ]
}
