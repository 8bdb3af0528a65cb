//! Parsing of Pact interaction templates.
//!
//! Accepts the interaction document a consumer registers with the Pact mock
//! service, in either matching-rule layout:
//!
//! - v2: `"matchingRules": { "$.body.name": {"match": "type"}, "$.path": {"match": "regex", "regex": "..."} }`
//! - v3: `"matchingRules": { "body": { "$.name": {"matchers": [...]}}, "path": {"matchers": [...]} }`
//!
//! On load every leaf of the request body without a covering matching rule
//! becomes an implicit equality constraint.

use super::path_matcher::PathMatcher;
use super::types::{Constraint, Interaction, InteractionError};
use crate::jsonpath::{self, Segment};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Keys that mark a body subtree as a matcher object rather than literal data.
const SENTINEL_KEYS: [&str; 2] = ["json_class", "pact:matcher:type"];

/// Parse a template and build the interaction, including its default
/// constraints. Nothing is registered anywhere on error.
pub fn parse_interaction(bytes: &[u8], alias: Option<&str>) -> Result<Interaction, InteractionError> {
    let definition: Value =
        serde_json::from_slice(bytes).map_err(|e| InteractionError::InvalidJson(e.to_string()))?;

    let description = definition
        .get("description")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .ok_or(InteractionError::MissingField("description"))?
        .to_string();

    let request = definition
        .get("request")
        .and_then(Value::as_object)
        .ok_or(InteractionError::MissingField("request.method"))?;

    let method = request
        .get("method")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .ok_or(InteractionError::MissingField("request.method"))?
        .to_ascii_uppercase();

    let rules = MatchingRules::from_request(request);
    let path = build_path_matcher(request, rules.path_regex.as_deref())?;

    let interaction = Interaction::new(
        description.clone(),
        alias.map(str::to_string),
        method,
        path,
        definition.clone(),
    );

    if let Some(body) = request.get("body") {
        for constraint in default_constraints(&description, body, &rules.body) {
            let key = constraint.key()?;
            interaction.constraints.insert(key, constraint);
        }
    }

    debug!(
        interaction = %description,
        constraints = interaction.constraints.len(),
        "Parsed interaction template"
    );
    Ok(interaction)
}

fn build_path_matcher(
    request: &Map<String, Value>,
    rule_regex: Option<&str>,
) -> Result<PathMatcher, InteractionError> {
    let compile = |pattern: &str| {
        PathMatcher::regex(pattern).map_err(|e| InteractionError::InvalidPathRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
    };

    match request.get("path") {
        Some(Value::String(path)) => match rule_regex {
            Some(pattern) => compile(pattern),
            None => Ok(PathMatcher::exact(path.as_str())),
        },
        // Ruby mock-service term: {"json_class": "Pact::Term", "data": {"generate": ..., "matcher": {"s": ...}}}
        Some(term @ Value::Object(_)) => {
            let pattern = rule_regex
                .or_else(|| term.pointer("/data/matcher/s").and_then(Value::as_str))
                .ok_or(InteractionError::MissingField("request.path"))?;
            compile(pattern)
        }
        _ => Err(InteractionError::MissingField("request.path")),
    }
}

/// Matching rules relevant to the proxy, extracted from a request template.
#[derive(Debug, Default)]
pub(crate) struct MatchingRules {
    pub path_regex: Option<String>,
    /// Body rule locations, rooted at `body` (`$.body.a` -> `[body, a]`).
    pub body: Vec<Vec<Segment>>,
}

impl MatchingRules {
    fn from_request(request: &Map<String, Value>) -> Self {
        let Some(Value::Object(raw)) = request.get("matchingRules") else {
            return Self::default();
        };

        let is_v3 = raw.keys().any(|k| !k.starts_with('$'));
        if is_v3 {
            Self::from_v3(raw)
        } else {
            Self::from_v2(raw)
        }
    }

    fn from_v2(raw: &Map<String, Value>) -> Self {
        let mut rules = Self::default();
        for (key, rule) in raw {
            if key == "$.path" {
                rules.path_regex = regex_of(rule).map(str::to_string);
            } else if key.starts_with("$.body") {
                match jsonpath::parse(key) {
                    Ok(segments) => rules.body.push(segments),
                    Err(e) => warn!("Ignoring unparsable matching rule '{}': {}", key, e),
                }
            }
        }
        rules
    }

    fn from_v3(raw: &Map<String, Value>) -> Self {
        let mut rules = Self::default();

        if let Some(path_rule) = raw.get("path") {
            rules.path_regex = path_rule
                .get("matchers")
                .and_then(Value::as_array)
                .and_then(|matchers| matchers.iter().find_map(regex_of))
                .or_else(|| regex_of(path_rule))
                .map(str::to_string);
        }

        if let Some(Value::Object(body)) = raw.get("body") {
            for key in body.keys() {
                match jsonpath::parse(key) {
                    Ok(mut segments) => {
                        segments.insert(0, Segment::Key("body".to_string()));
                        rules.body.push(segments);
                    }
                    Err(e) => warn!("Ignoring unparsable matching rule '{}': {}", key, e),
                }
            }
        }
        rules
    }
}

fn regex_of(rule: &Value) -> Option<&str> {
    if rule.get("match").and_then(Value::as_str) == Some("regex") {
        rule.get("regex").and_then(Value::as_str)
    } else {
        None
    }
}

/// A rule covers a body location when it addresses that location or one of
/// its ancestors; `*` stands for any key or index.
pub(crate) fn rule_covers(rule: &[Segment], leaf: &[Segment]) -> bool {
    rule.len() <= leaf.len()
        && rule.iter().zip(leaf).all(|(r, l)| match (r, l) {
            (Segment::Wildcard, _) => true,
            (Segment::Key(a), Segment::Key(b)) => a == b,
            (Segment::Index(a), Segment::Index(b)) => a == b,
            _ => false,
        })
}

/// Derive the implicit equality constraints for a template body.
pub(crate) fn default_constraints(
    interaction: &str,
    body: &Value,
    rules: &[Vec<Segment>],
) -> Vec<Constraint> {
    let mut leaves = Vec::new();
    let mut location = vec![Segment::Key("body".to_string())];
    collect_leaves(body, &mut location, &mut leaves);

    leaves
        .into_iter()
        .filter(|(segments, _)| !rules.iter().any(|rule| rule_covers(rule, segments)))
        .map(|(segments, value)| {
            Constraint::equals(interaction, &jsonpath::dotted(&segments), value)
        })
        .collect()
}

fn collect_leaves(value: &Value, location: &mut Vec<Segment>, out: &mut Vec<(Vec<Segment>, Value)>) {
    match value {
        Value::Object(map) => {
            if SENTINEL_KEYS.iter().any(|k| map.contains_key(*k)) {
                return;
            }
            for (key, child) in map {
                location.push(Segment::Key(key.clone()));
                collect_leaves(child, location, out);
                location.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                location.push(Segment::Index(index));
                collect_leaves(child, location, out);
                location.pop();
            }
        }
        scalar => out.push((location.clone(), scalar.clone())),
    }
}
