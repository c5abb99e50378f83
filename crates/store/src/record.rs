use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::{StoreError, StoreResult};

/// The two record kinds, one log file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Results,
    Feedback,
}

impl LogKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            LogKind::Results => "results.jsonl",
            LogKind::Feedback => "feedback.jsonl",
        }
    }

    pub fn write_error(&self) -> &'static str {
        match self {
            LogKind::Results => "Unable to write file",
            LogKind::Feedback => "Unable to write feedback",
        }
    }

    pub fn read_error(&self) -> &'static str {
        match self {
            LogKind::Results => "Unable to read data",
            LogKind::Feedback => "Unable to read feedback",
        }
    }
}

/// A classified record: the target log plus the normalized body to append.
#[derive(Debug, Clone)]
pub struct Record {
    pub kind: LogKind,
    pub body: Value,
}

/// Parse a raw request body and classify it.
///
/// Anything that is not a JSON object is rejected. The `type` field picks
/// the log (default `trial`); a non-string `type` falls through to the
/// trial path with the payload kept as-is. Trial payloads pass through
/// verbatim apart from a `ts` filled in when absent; feedback payloads are
/// normalized to a fixed shape.
pub fn classify(raw: &[u8]) -> StoreResult<Record> {
    let payload: Value =
        serde_json::from_slice(raw).map_err(|_| StoreError::invalid_input())?;

    let Value::Object(mut fields) = payload else {
        return Err(StoreError::invalid_input());
    };

    let is_feedback = fields
        .get("type")
        .and_then(Value::as_str)
        .map(|kind| kind == "feedback")
        .unwrap_or(false);

    if is_feedback {
        return Ok(Record {
            kind: LogKind::Feedback,
            body: normalize_feedback(&fields),
        });
    }

    if missing(&fields, "ts") {
        fields.insert("ts".to_string(), Value::String(current_timestamp()));
    }

    Ok(Record {
        kind: LogKind::Results,
        body: Value::Object(fields),
    })
}

/// Feedback records always carry exactly these seven fields; whatever else
/// the client sent is dropped, and absent fields get their defaults.
fn normalize_feedback(fields: &Map<String, Value>) -> Value {
    json!({
        "type": "feedback",
        "pid": supplied(fields, "pid").unwrap_or(Value::Null),
        "nickname": supplied(fields, "nickname").unwrap_or(Value::Null),
        "conditions": supplied(fields, "conditions").unwrap_or_else(|| json!([])),
        "device_type": supplied(fields, "device_type").unwrap_or(Value::Null),
        "comment": supplied(fields, "comment").unwrap_or_else(|| json!("")),
        "ts": supplied(fields, "ts").unwrap_or_else(|| Value::String(current_timestamp())),
    })
}

// An explicit JSON null counts as absent, same as a missing key.
fn supplied(fields: &Map<String, Value>, name: &str) -> Option<Value> {
    fields.get(name).filter(|value| !value.is_null()).cloned()
}

fn missing(fields: &Map<String, Value>, name: &str) -> bool {
    fields.get(name).map_or(true, Value::is_null)
}

pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
