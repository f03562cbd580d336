//! Request fingerprints.
//!
//! A fingerprint is the MD5 of `entry_point ++ serialize(query) ++ request_path`,
//! where `serialize` is the PHP `serialize()` wire format. Keeping that exact
//! byte layout lets fingerprints line up with tables written by the legacy
//! labeler sharing the same store.

use std::fmt;
use std::fmt::Write as _;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// 128-bit request identity, rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the fingerprint of a logical request.
///
/// Key order in `query` is significant, as are value types (`"1"` and `1`
/// hash differently).
pub fn fingerprint(entry_point: &str, query: &Map<String, Value>, request_path: &str) -> RequestFingerprint {
    let mut serialized = String::new();
    serialize_array(query.iter().map(|(k, v)| (k.as_str(), v)), query.len(), &mut serialized);

    let mut hasher = Md5::new();
    hasher.update(entry_point.as_bytes());
    hasher.update(serialized.as_bytes());
    hasher.update(request_path.as_bytes());
    RequestFingerprint(hex::encode(hasher.finalize()))
}

/// MD5 hex digest of arbitrary content. Used to content-address dependency snapshots.
pub fn content_digest(content: &str) -> String {
    hex::encode(Md5::digest(content.as_bytes()))
}

fn serialize_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("N;"),
        Value::Bool(b) => {
            let _ = write!(out, "b:{};", u8::from(*b));
        }
        Value::Number(n) => serialize_number(n, out),
        Value::String(s) => serialize_string(s, out),
        Value::Array(items) => {
            let _ = write!(out, "a:{}:{{", items.len());
            for (idx, item) in items.iter().enumerate() {
                let _ = write!(out, "i:{idx};");
                serialize_value(item, out);
            }
            out.push('}');
        }
        Value::Object(map) => serialize_array(map.iter().map(|(k, v)| (k.as_str(), v)), map.len(), out),
    }
}

fn serialize_array<'a>(entries: impl Iterator<Item = (&'a str, &'a Value)>, len: usize, out: &mut String) {
    let _ = write!(out, "a:{len}:{{");
    for (key, value) in entries {
        serialize_key(key, out);
        serialize_value(value, out);
    }
    out.push('}');
}

/// PHP stores canonical decimal string keys ("7", "-3") as integer keys.
fn serialize_key(key: &str, out: &mut String) {
    match integer_key(key) {
        Some(n) => {
            let _ = write!(out, "i:{n};");
        }
        None => serialize_string(key, out),
    }
}

fn integer_key(key: &str) -> Option<i64> {
    let digits = key.strip_prefix('-').unwrap_or(key);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    if key == "-0" {
        return None;
    }
    key.parse().ok()
}

fn serialize_string(s: &str, out: &mut String) {
    let _ = write!(out, "s:{}:\"{}\";", s.len(), s);
}

fn serialize_number(n: &Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "i:{i};");
    } else if let Some(f) = n.as_f64() {
        let _ = write!(out, "d:{};", php_float(f));
    }
}

/// Shortest round-trip rendering with PHP's switch to `1.0E+25` notation
/// outside the `[1e-4, 1e15)` magnitude range.
fn php_float(f: f64) -> String {
    if f.is_nan() {
        return "NAN".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF".into() } else { "-INF".into() };
    }
    let magnitude = f.abs();
    if f == 0.0 || (1e-4..1e15).contains(&magnitude) {
        return format!("{f}");
    }
    let sci = format!("{f:E}");
    let Some((mantissa, exponent)) = sci.split_once('E') else {
        return sci;
    };
    let mantissa = if mantissa.contains('.') { mantissa.to_string() } else { format!("{mantissa}.0") };
    match exponent.strip_prefix('-') {
        Some(exp) => format!("{mantissa}E-{exp}"),
        None => format!("{mantissa}E+{exponent}"),
    }
}
