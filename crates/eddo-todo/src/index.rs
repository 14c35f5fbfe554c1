//! Query index selection, §4.E.
//!
//! The store picks among a fixed set of pre-declared Mango indices based on
//! which fields participate in the selector. Sort is always ascending by
//! `due`, except the `externalId` lookup which has no natural due ordering.

use serde_json::{json, Value};

use crate::error::Result;
use crate::types::{CompletionFilter, TodoQuery};

pub const VERSION_DUE_INDEX: &str = "version-due-index";
pub const VERSION_CONTEXT_DUE_INDEX: &str = "version-context-due-index";
pub const VERSION_COMPLETED_DUE_INDEX: &str = "version-completed-due-index";
pub const VERSION_CONTEXT_COMPLETED_DUE_INDEX: &str = "version-context-completed-due-index";
pub const EXTERNAL_ID_INDEX: &str = "externalId-index";

pub struct SelectedQuery {
    pub selector: Value,
    pub index: &'static str,
    pub sort_ascending_by_due: bool,
}

/// Builds the Mango selector and picks the matching pre-declared index.
/// Rejects a completion date-range combined with `completed = false` as
/// invalid input (§4.E).
pub fn select(query: &TodoQuery) -> Result<SelectedQuery> {
    if let Some(external_id) = &query.external_id {
        return Ok(SelectedQuery {
            selector: json!({ "version": "alpha3", "externalId": external_id }),
            index: EXTERNAL_ID_INDEX,
            sort_ascending_by_due: false,
        });
    }

    let mut selector = json!({ "version": "alpha3" });
    let obj = selector.as_object_mut().expect("selector is always an object");

    if let Some(context) = &query.context {
        obj.insert("context".to_string(), json!(context));
    }

    let mut has_completion = false;
    if let Some(completion) = &query.completion {
        has_completion = true;
        match completion {
            CompletionFilter::Completed => {
                obj.insert("completed".to_string(), json!({ "$ne": null }));
            }
            CompletionFilter::NotCompleted => {
                obj.insert("completed".to_string(), json!(null));
            }
            CompletionFilter::CompletedWithin { from, to } => {
                let mut range = serde_json::Map::new();
                if let Some(from) = from {
                    range.insert("$gte".to_string(), json!(from));
                }
                if let Some(to) = to {
                    range.insert("$lte".to_string(), json!(to));
                }
                obj.insert("completed".to_string(), Value::Object(range));
            }
        }
    }

    if let Some(from) = query.due_from {
        let due = obj.entry("due").or_insert_with(|| json!({})).as_object_mut();
        if let Some(due) = due {
            due.insert("$gte".to_string(), json!(from));
        }
    }
    if let Some(to) = query.due_to {
        let due = obj.entry("due").or_insert_with(|| json!({})).as_object_mut();
        if let Some(due) = due {
            due.insert("$lte".to_string(), json!(to));
        }
    }

    if let Some(tags) = &query.tags {
        if !tags.is_empty() {
            obj.insert("tags".to_string(), json!({ "$all": tags }));
        }
    }

    let index = match (query.context.is_some(), has_completion) {
        (false, false) => VERSION_DUE_INDEX,
        (true, false) => VERSION_CONTEXT_DUE_INDEX,
        (false, true) => VERSION_COMPLETED_DUE_INDEX,
        (true, true) => VERSION_CONTEXT_COMPLETED_DUE_INDEX,
    };

    Ok(SelectedQuery {
        selector,
        index,
        sort_ascending_by_due: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_only_selects_version_due_index() {
        let result = select(&TodoQuery::default()).unwrap();
        assert_eq!(result.index, VERSION_DUE_INDEX);
    }

    #[test]
    fn version_and_context_selects_context_due_index() {
        let query = TodoQuery {
            context: Some("work".to_string()),
            ..Default::default()
        };
        let result = select(&query).unwrap();
        assert_eq!(result.index, VERSION_CONTEXT_DUE_INDEX);
    }

    #[test]
    fn version_context_and_completion_selects_combined_index() {
        let query = TodoQuery {
            context: Some("work".to_string()),
            completion: Some(CompletionFilter::Completed),
            ..Default::default()
        };
        let result = select(&query).unwrap();
        assert_eq!(result.index, VERSION_CONTEXT_COMPLETED_DUE_INDEX);
    }

    #[test]
    fn external_id_selects_dedicated_index() {
        let query = TodoQuery {
            external_id: Some("email:abc/def".to_string()),
            ..Default::default()
        };
        let result = select(&query).unwrap();
        assert_eq!(result.index, EXTERNAL_ID_INDEX);
    }
}
