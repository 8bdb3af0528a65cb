//! JSON-path helpers shared by constraints, modifiers and default constraint
//! derivation.
//!
//! Paths arrive in the loose form Pact tooling writes (`$.body.user.name`,
//! `$.body.items[0]`, `$.query.filter[status]`). Before evaluation they are
//! parsed into segments and re-rendered in RFC 9535 bracket notation
//! (`$['body']['user']['name']`) so that keys containing characters which are
//! ambiguous in dot notation (dashes, spaces, brackets from query syntax) are
//! always valid quoted member names. Evaluation is delegated to
//! `serde_json_path`.

use serde_json::Value;
use serde_json_path::JsonPath;
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing or evaluating a path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path '{path}': {reason}")]
    Parse { path: String, reason: String },
    #[error("no value at path '{0}'")]
    NotFound(String),
    #[error("path '{0}' matched more than one value")]
    NotUnique(String),
    #[error("cannot write through path '{0}'")]
    InvalidTarget(String),
}

/// Highest array index `set` will write through; larger indexes would pad the
/// array with an unbounded number of nulls.
pub const MAX_WRITE_INDEX: usize = 10_000;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => {
                let escaped = key.replace('\\', "\\\\").replace('\'', "\\'");
                write!(f, "['{escaped}']")
            }
            Segment::Index(index) => write!(f, "[{index}]"),
            Segment::Wildcard => write!(f, "[*]"),
        }
    }
}

/// Parse a path expression into segments.
///
/// Bracketed segments under `$.query` are always treated as object keys, since
/// query parameters are reconstructed into nested maps and `ids[0]=1` means key
/// `"0"`, not array index 0.
pub fn parse(path: &str) -> Result<Vec<Segment>, PathError> {
    let err = |reason: &str| PathError::Parse {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let rest = path
        .trim()
        .strip_prefix('$')
        .ok_or_else(|| err("must start with '$'"))?;
    let chars: Vec<char> = rest.chars().collect();
    let mut segments = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                if name.is_empty() {
                    return Err(err("empty member name"));
                }
                if name == "*" {
                    segments.push(Segment::Wildcard);
                } else {
                    segments.push(Segment::Key(name));
                }
            }
            '[' => {
                i += 1;
                if i < chars.len() && (chars[i] == '\'' || chars[i] == '"') {
                    let quote = chars[i];
                    i += 1;
                    let mut key = String::new();
                    loop {
                        match chars.get(i) {
                            None => return Err(err("unterminated quoted key")),
                            Some('\\') => {
                                let escaped =
                                    chars.get(i + 1).ok_or_else(|| err("dangling escape"))?;
                                key.push(*escaped);
                                i += 2;
                            }
                            Some(c) if *c == quote => {
                                i += 1;
                                break;
                            }
                            Some(c) => {
                                key.push(*c);
                                i += 1;
                            }
                        }
                    }
                    if chars.get(i) != Some(&']') {
                        return Err(err("expected ']' after quoted key"));
                    }
                    i += 1;
                    segments.push(Segment::Key(key));
                } else {
                    let start = i;
                    while i < chars.len() && chars[i] != ']' {
                        i += 1;
                    }
                    if i >= chars.len() {
                        return Err(err("unterminated '['"));
                    }
                    let raw: String = chars[start..i].iter().collect();
                    i += 1;
                    segments.push(bracket_segment(&raw, in_query(&segments)));
                }
            }
            _ => return Err(err("expected '.' or '['")),
        }
    }

    Ok(segments)
}

fn in_query(segments: &[Segment]) -> bool {
    matches!(segments.first(), Some(Segment::Key(k)) if k == "query")
}

fn bracket_segment(raw: &str, query_key: bool) -> Segment {
    if raw == "*" {
        return Segment::Wildcard;
    }
    if !query_key {
        if let Ok(index) = raw.parse::<usize>() {
            return Segment::Index(index);
        }
    }
    Segment::Key(raw.to_string())
}

/// Render segments in RFC 9535 normalized bracket form.
pub fn canonical(segments: &[Segment]) -> String {
    let mut out = String::from("$");
    for segment in segments {
        out.push_str(&segment.to_string());
    }
    out
}

/// Render segments in dot notation where keys allow it, for diagnostics.
pub fn dotted(segments: &[Segment]) -> String {
    let mut out = String::from("$");
    for segment in segments {
        match segment {
            Segment::Key(key)
                if !key.is_empty()
                    && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
            {
                out.push('.');
                out.push_str(key);
            }
            other => out.push_str(&other.to_string()),
        }
    }
    out
}

/// Canonicalize a loose path expression.
pub fn canonicalize(path: &str) -> Result<String, PathError> {
    parse(path).map(|segments| canonical(&segments))
}

/// Select the value at `path` in `document`.
///
/// Paths containing a wildcard return every match as an array; any other path
/// must resolve to exactly one node.
pub fn select(document: &Value, path: &str) -> Result<Value, PathError> {
    let segments = parse(path)?;
    let canonical_path = canonical(&segments);
    let compiled = JsonPath::parse(&canonical_path).map_err(|e| PathError::Parse {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    let nodes = compiled.query(document).all();
    if segments.contains(&Segment::Wildcard) {
        return Ok(Value::Array(nodes.into_iter().cloned().collect()));
    }

    match nodes.as_slice() {
        [] => Err(PathError::NotFound(path.to_string())),
        [single] => Ok((*single).clone()),
        _ => Err(PathError::NotUnique(path.to_string())),
    }
}

/// Write `value` at `segments` inside `document`, creating intermediate
/// objects and arrays as needed. Scalars in the way are replaced.
pub fn set(document: &mut Value, segments: &[Segment], value: Value) -> Result<(), PathError> {
    let mut current = document;
    for segment in segments {
        current = match segment {
            Segment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(serde_json::Map::new());
                }
                match current {
                    Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                    _ => return Err(PathError::InvalidTarget(canonical(segments))),
                }
            }
            Segment::Index(index) => {
                let len = index
                    .checked_add(1)
                    .filter(|_| *index <= MAX_WRITE_INDEX)
                    .ok_or_else(|| PathError::InvalidTarget(canonical(segments)))?;
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                match current {
                    Value::Array(items) => {
                        if items.len() < len {
                            items.resize(len, Value::Null);
                        }
                        &mut items[*index]
                    }
                    _ => return Err(PathError::InvalidTarget(canonical(segments))),
                }
            }
            Segment::Wildcard => return Err(PathError::InvalidTarget(canonical(segments))),
        };
    }
    *current = value;
    Ok(())
}
