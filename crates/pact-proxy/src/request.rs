//! Request normalization.
//!
//! Turns the raw pieces of an inbound HTTP request into the document that
//! constraints are evaluated against:
//!
//! ```json
//! { "path": "/users/1", "body": { ... } | [ ... ] | "raw", "query": { "a": { "b": "x" } } }
//! ```
//!
//! Query parameters written with bracket syntax (`a[b][c]=x`) are rebuilt into
//! nested maps. Form-encoded bodies get the same treatment.

use crate::jsonpath::{self, PathError};
use serde_json::{Map, Value};

/// Structured, path-safe view of an inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    document: Value,
}

impl NormalizedRequest {
    /// Build the document from request parts. `path` is the raw request
    /// path; percent escapes are decoded.
    pub fn from_parts(
        path: &str,
        query: Option<&str>,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Self {
        let mut document = Map::new();
        document.insert("path".to_string(), Value::String(decode_path(path)));
        document.insert("body".to_string(), decode_body(content_type, body));
        document.insert("query".to_string(), parse_nested_query(query.unwrap_or("")));
        Self {
            document: Value::Object(document),
        }
    }

    /// Wrap an already-built document (used when resolving captured requests).
    pub fn from_document(document: Value) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn path(&self) -> &str {
        self.document
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn body(&self) -> &Value {
        self.document.get("body").unwrap_or(&Value::Null)
    }

    /// Evaluate a JSON-path expression against the document.
    pub fn select(&self, path: &str) -> Result<Value, PathError> {
        jsonpath::select(&self.document, path)
    }
}

fn decode_body(content_type: Option<&str>, body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }

    let content_type = content_type.unwrap_or("").to_ascii_lowercase();
    if content_type.contains("application/x-www-form-urlencoded") {
        return parse_nested_query(&String::from_utf8_lossy(body));
    }

    if content_type.is_empty() || content_type.contains("json") {
        if let Ok(value) = serde_json::from_slice::<Value>(body) {
            if value.is_object() || value.is_array() {
                return value;
            }
        }
    }

    Value::String(String::from_utf8_lossy(body).into_owned())
}

/// Parse a query string into a nested map.
///
/// - `a=x` becomes `{"a": "x"}`
/// - `a[b][c]=x` becomes `{"a": {"b": {"c": "x"}}}`
/// - `a[]=x&a[]=y` and repeated plain keys become arrays
pub fn parse_nested_query(query: &str) -> Value {
    let mut root = Map::new();

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(raw_key);
        let value = Value::String(decode_component(raw_value));

        let (base, path) = split_bracket_key(&key);
        if base.is_empty() {
            continue;
        }
        insert_nested(&mut root, base, &path, value);
    }

    Value::Object(root)
}

/// Percent-decode a path. `+` stays literal; only query strings use it for spaces.
fn decode_path(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Split `a[b][c]` into `("a", ["b", "c"])`. A malformed tail is kept as part of
/// the base key.
fn split_bracket_key(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };

    let base = &key[..open];
    let mut parts = Vec::new();
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        match inner.find(']') {
            Some(close) => {
                parts.push(&inner[..close]);
                rest = &inner[close + 1..];
            }
            None => return (key, Vec::new()),
        }
    }
    if !rest.is_empty() {
        return (key, Vec::new());
    }
    (base, parts)
}

fn insert_nested(map: &mut Map<String, Value>, key: &str, path: &[&str], value: Value) {
    match path.split_first() {
        None => merge_leaf(map, key, value),
        Some((&"", _)) => {
            let slot = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match slot {
                Value::Array(items) => items.push(value),
                other => *other = Value::Array(vec![other.take(), value]),
            }
        }
        Some((next, rest)) => {
            let slot = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                insert_nested(child, next, rest, value);
            }
        }
    }
}

fn merge_leaf(map: &mut Map<String, Value>, key: &str, value: Value) {
    match map.get_mut(key) {
        None => {
            map.insert(key.to_string(), value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
    }
}
