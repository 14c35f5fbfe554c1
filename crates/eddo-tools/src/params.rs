//! Typed request parameters for the fixed tool catalog, §4.H.
//!
//! Deserializing straight into these structs is the tool server's sole
//! entry boundary for untrusted input (§9).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use eddo_todo::MetadataValue;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoParams {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub repeat: Option<i64>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListTodosParams {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct IdParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleCompletionParams {
    pub id: String,
    pub completed: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ServerInfoParams {
    #[serde(default)]
    pub section: Option<String>,
}
