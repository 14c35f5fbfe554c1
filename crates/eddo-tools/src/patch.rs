//! `updateTodo`'s patch decoding: explicit JSON `null` on a nullable field
//! clears it, an absent key leaves it untouched (§4.H).

use eddo_core::CoreError;
use eddo_todo::{MetadataValue, TodoPatch};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

#[derive(serde::Deserialize)]
pub struct UpdateTodoParams {
    pub id: String,
    pub patch: Value,
}

fn field<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str) -> Result<Option<T>, CoreError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| CoreError::Validation(format!("invalid `{key}`: {e}"))),
    }
}

/// `None` if the key is absent; `Some(None)` if present and explicitly
/// `null`; `Some(Some(value))` if present and non-null.
fn nullable_field<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str) -> Result<Option<Option<T>>, CoreError> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => serde_json::from_value(v.clone())
            .map(|parsed| Some(Some(parsed)))
            .map_err(|e| CoreError::Validation(format!("invalid `{key}`: {e}"))),
    }
}

pub fn parse_todo_patch(patch: &Value) -> Result<TodoPatch, CoreError> {
    let obj = patch
        .as_object()
        .ok_or_else(|| CoreError::Validation("patch must be a JSON object".to_string()))?;

    Ok(TodoPatch {
        title: field(obj, "title")?,
        description: nullable_field(obj, "description")?,
        context: nullable_field(obj, "context")?,
        due: field(obj, "due")?,
        tags: field(obj, "tags")?,
        repeat: nullable_field(obj, "repeat")?,
        link: nullable_field(obj, "link")?,
        external_id: nullable_field::<String>(obj, "externalId")?,
        metadata: field::<std::collections::HashMap<String, MetadataValue>>(obj, "metadata")?,
    })
}
