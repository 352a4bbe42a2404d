//! Purpose: Define a stable, structured schema for non-fatal stderr notices.
//! Exports: `Notice`, `notice_json`, `notice_time_now`.
//! Role: Shared contract helper for CLI diagnostics (skipped or failed collections).
//! Invariants: Notices are non-fatal and never alter stdout payloads.
//! Invariants: JSON schema is additive-only; `collection` is omitted when not applicable.
use serde_json::{Map, Value, json};
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub collection: Option<String>,
    pub message: String,
    pub details: Map<String, Value>,
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind));
    inner.insert("time".to_string(), json!(notice.time));
    inner.insert("cmd".to_string(), json!(notice.cmd));
    if let Some(collection) = &notice.collection {
        inner.insert("collection".to_string(), json!(collection));
    }
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));

    let mut outer = Map::new();
    outer.insert("notice".to_string(), Value::Object(inner));
    Value::Object(outer)
}

/// RFC 3339 UTC timestamp for notices; empty when the clock is unusable.
pub fn notice_time_now() -> String {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return String::new();
    };
    time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128)
        .ok()
        .and_then(|ts| ts.format(&Rfc3339).ok())
        .unwrap_or_default()
}
