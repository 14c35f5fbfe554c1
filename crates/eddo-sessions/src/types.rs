use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStats {
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub user_message_count: u64,
    #[serde(default)]
    pub assistant_message_count: u64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub tool_call_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub username: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub container_state: Option<Value>,
    #[serde(default)]
    pub worktree_state: Option<Value>,
    #[serde(default)]
    pub stats: SessionStats,
    #[serde(default)]
    pub parent_session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_cost: f64,
}

/// A message entry's typed payload. `tool_call_count` (§4.F) is derived
/// from the number of `ContentItem::ToolCall` items, not stored directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub role: Role,
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text { text: String },
    ToolCall { name: String, input: Value },
    ToolResult { content: Value },
}

impl MessagePayload {
    pub fn tool_call_count(&self) -> u64 {
        self.content
            .iter()
            .filter(|item| matches!(item, ContentItem::ToolCall { .. }))
            .count() as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryPayload {
    Message(MessagePayload),
    Other(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(flatten)]
    pub payload: EntryPayload,
}

#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub username: String,
    pub name: String,
    pub repository: Option<String>,
    pub parent_session_id: Option<String>,
}

/// The stats delta a new entry contributes, computed purely from the
/// message payload (§4.F).
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsDelta {
    pub message_count: u64,
    pub user_message_count: u64,
    pub assistant_message_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost: f64,
    pub tool_call_count: u64,
}

impl StatsDelta {
    pub fn for_payload(payload: &EntryPayload) -> Self {
        let EntryPayload::Message(message) = payload else {
            return Self::default();
        };

        match message.role {
            Role::User => Self {
                message_count: 1,
                user_message_count: 1,
                ..Default::default()
            },
            Role::Assistant => {
                let usage = message.usage.unwrap_or_default();
                Self {
                    message_count: 1,
                    assistant_message_count: 1,
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    total_cost: usage.total_cost,
                    tool_call_count: message.tool_call_count(),
                }
            }
        }
    }

    pub fn apply(&self, stats: &mut SessionStats) {
        stats.message_count += self.message_count;
        stats.user_message_count += self.user_message_count;
        stats.assistant_message_count += self.assistant_message_count;
        stats.input_tokens += self.input_tokens;
        stats.output_tokens += self.output_tokens;
        stats.total_cost += self.total_cost;
        stats.tool_call_count += self.tool_call_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_delta() {
        let payload = EntryPayload::Message(MessagePayload {
            role: Role::User,
            content: vec![ContentItem::Text { text: "hi".to_string() }],
            usage: None,
        });
        let delta = StatsDelta::for_payload(&payload);
        assert_eq!(delta.message_count, 1);
        assert_eq!(delta.user_message_count, 1);
        assert_eq!(delta.assistant_message_count, 0);
    }

    #[test]
    fn assistant_message_delta_includes_usage_and_tool_calls() {
        let payload = EntryPayload::Message(MessagePayload {
            role: Role::Assistant,
            content: vec![
                ContentItem::Text { text: "ok".to_string() },
                ContentItem::ToolCall {
                    name: "read_file".to_string(),
                    input: Value::Null,
                },
            ],
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 20,
                total_cost: 0.05,
            }),
        });
        let delta = StatsDelta::for_payload(&payload);
        assert_eq!(delta.assistant_message_count, 1);
        assert_eq!(delta.input_tokens, 10);
        assert_eq!(delta.output_tokens, 20);
        assert_eq!(delta.tool_call_count, 1);
    }
}
