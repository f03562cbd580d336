//! Request identity and the record persisted for each distinct request.

pub mod fingerprint;
pub mod sanitize;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use fingerprint::{RequestFingerprint, content_digest, fingerprint};
pub use sanitize::sanitize;

/// Already-parsed view of one inbound request, supplied by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    /// Script path serving as entry point (e.g. `/index.php`).
    pub entry_point: String,
    /// Query parameters in the order the client supplied them.
    pub query: Map<String, Value>,
    pub request_path: String,
    /// Absolute filesystem path of the entry point script.
    pub script_file: String,
    pub body: Map<String, Value>,
}

impl RequestContext {
    pub fn fingerprint(&self) -> RequestFingerprint {
        fingerprint(&self.entry_point, &self.query, &self.request_path)
    }
}

/// The JSON document stored under a request fingerprint.
///
/// Field names match the archived log format consumed downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    #[serde(rename = "entryPoint")]
    pub entry_point: String,
    #[serde(rename = "GET")]
    pub query: Map<String, Value>,
    #[serde(rename = "POST")]
    pub body: Map<String, Value>,
    #[serde(rename = "requestPath")]
    pub request_path: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

impl RequestRecord {
    /// Build the record for `ctx`, redacting body fields over `max_field_bytes`.
    pub fn from_context(ctx: &RequestContext, max_field_bytes: usize) -> Self {
        Self {
            entry_point: ctx.entry_point.clone(),
            query: ctx.query.clone(),
            body: sanitize(&ctx.body, max_field_bytes),
            request_path: ctx.request_path.clone(),
            file_path: ctx.script_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> RequestContext {
        let Value::Object(query) = json!({"key": "value"}) else { unreachable!() };
        let Value::Object(body) = json!({"key": "value", "upload": {"name": "a.jpg"}}) else { unreachable!() };
        RequestContext {
            entry_point: "/index.php".into(),
            query,
            request_path: "/index.php?key=value".into(),
            script_file: "/var/www/html/index.php".into(),
            body,
        }
    }

    #[test]
    fn test_record_json_shape() {
        let record = RequestRecord::from_context(&context(), 1024);
        let encoded = serde_json::to_string(&record).unwrap();
        assert_eq!(
            encoded,
            r#"{"entryPoint":"/index.php","GET":{"key":"value"},"POST":{"key":"value","upload":"[Complex Data]"},"requestPath":"/index.php?key=value","filePath":"/var/www/html/index.php"}"#
        );
    }

    #[test]
    fn test_record_round_trip() {
        let record = RequestRecord::from_context(&context(), 1024);
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: RequestRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_context_fingerprint_uses_entry_query_and_path() {
        let ctx = context();
        let other_body = RequestContext { body: Map::new(), script_file: "/elsewhere.php".into(), ..context() };
        assert_eq!(ctx.fingerprint(), other_body.fingerprint());
        assert_eq!(ctx.fingerprint(), fingerprint("/index.php", &ctx.query, "/index.php?key=value"));
    }
}
