//! Body field redaction applied before a request record is persisted.

use serde_json::{Map, Value};

pub const COMPLEX_PLACEHOLDER: &str = "[Complex Data]";
pub const TOO_LARGE_PLACEHOLDER: &str = "[Data too large to log]";

/// Default field size limit in bytes.
pub const DEFAULT_MAX_FIELD_BYTES: usize = 1024;

/// Replace structured values and oversized scalars with placeholders.
///
/// Arrays and objects become `"[Complex Data]"`. Scalars whose string
/// rendering exceeds `max_bytes` become `"[Data too large to log]"`. Every
/// other value passes through unchanged, type included. Field order is kept.
pub fn sanitize(body: &Map<String, Value>, max_bytes: usize) -> Map<String, Value> {
    body.iter()
        .map(|(key, value)| (key.clone(), sanitize_field(value, max_bytes)))
        .collect()
}

fn sanitize_field(value: &Value, max_bytes: usize) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(COMPLEX_PLACEHOLDER.into()),
        scalar if scalar_len(scalar) > max_bytes => Value::String(TOO_LARGE_PLACEHOLDER.into()),
        scalar => scalar.clone(),
    }
}

fn scalar_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        Value::Null => 0,
        Value::Bool(true) => 1,
        Value::Bool(false) => 0,
        other => other.to_string().len(),
    }
}
