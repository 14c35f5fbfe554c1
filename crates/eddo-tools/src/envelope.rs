//! The tool server's structured response envelope, §4.H.
//!
//! Every tool execution produces one of these regardless of the underlying
//! exception kind; `error_type` is the stable classification the caller
//! programs against.

use chrono::{DateTime, Utc};
use eddo_core::CoreError;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
pub struct SuccessEnvelope {
    pub summary: String,
    pub data: Value,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureEnvelope {
    pub summary: String,
    pub error: String,
    pub recovery_suggestions: Vec<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Success(SuccessEnvelope),
    Failure(FailureEnvelope),
}

fn execution_time_ms(started: DateTime<Utc>) -> i64 {
    (Utc::now() - started).num_milliseconds()
}

pub fn success(operation: &str, summary: impl Into<String>, data: Value, started: DateTime<Utc>) -> Envelope {
    Envelope::Success(SuccessEnvelope {
        summary: summary.into(),
        data,
        metadata: json!({
            "operation": operation,
            "execution_time": execution_time_ms(started),
            "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }),
    })
}

fn recovery_suggestions(error_type: &str) -> Vec<String> {
    match error_type {
        "not_found" => vec!["verify the id and retry".to_string()],
        "validation_error" => vec!["fix the request parameters and retry".to_string()],
        "auth_error" => vec!["include a valid X-User-ID header identifying a registered user".to_string()],
        _ => vec!["retry shortly; if the problem persists, contact an operator".to_string()],
    }
}

pub fn failure(operation: &str, error: &CoreError, started: DateTime<Utc>) -> Envelope {
    let error_type = error.error_type();
    Envelope::Failure(FailureEnvelope {
        summary: format!("{operation} failed"),
        error: error.to_string(),
        recovery_suggestions: recovery_suggestions(error_type),
        metadata: json!({
            "operation": operation,
            "execution_time": execution_time_ms(started),
            "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "error_type": error_type,
        }),
    })
}
