//! Type definitions for interactions, constraints and modifiers.

use super::modifiers::ModifierSet;
use super::path_matcher::PathMatcher;
use crate::jsonpath;
use crate::request::NormalizedRequest;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Path that targets the response status code in a modifier.
pub const STATUS_PATH: &str = "$.status";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InteractionError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid path matching regex '{pattern}': {reason}")]
    InvalidPathRegex { pattern: String, reason: String },
    #[error("interaction '{0}' not found")]
    UnknownInteraction(String),
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
    #[error("invalid modifier: {0}")]
    InvalidModifier(String),
}

// ============================================================================
// Constraint
// ============================================================================

fn default_format() -> String {
    "%v".to_string()
}

/// A rule asserting that a field of an incoming request equals an expected
/// value.
///
/// When `source` is set, each entry of `values` is a path evaluated against the
/// source interaction's last captured request at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub interaction: String,
    pub path: String,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Constraint {
    /// Literal constraint with a single `%v` value.
    pub fn equals(interaction: &str, path: &str, value: Value) -> Self {
        Self {
            interaction: interaction.to_string(),
            path: path.to_string(),
            values: vec![value],
            format: default_format(),
            source: None,
        }
    }

    /// Storage key: the canonical form of `path`, so `$.body.a` and
    /// `$['body']['a']` address the same slot.
    pub fn key(&self) -> Result<String, InteractionError> {
        jsonpath::canonicalize(&self.path)
            .map_err(|e| InteractionError::InvalidConstraint(e.to_string()))
    }

    pub(crate) fn validate(&self) -> Result<(), InteractionError> {
        if self.interaction.is_empty() {
            return Err(InteractionError::InvalidConstraint(
                "'interaction' is required".to_string(),
            ));
        }
        self.key()?;
        if self.source.is_some() {
            for value in &self.values {
                let expr = value.as_str().ok_or_else(|| {
                    InteractionError::InvalidConstraint(format!(
                        "sourced values must be path strings, got {value}"
                    ))
                })?;
                jsonpath::parse(expr)
                    .map_err(|e| InteractionError::InvalidConstraint(e.to_string()))?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Modifier
// ============================================================================

/// A response mutation for a matched interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Modifier {
    pub interaction: String,
    pub path: String,
    pub value: Value,
    /// 1-based request ordinal; `None` applies to every attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u64>,
}

/// What a modifier rewrites, resolved from its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifierTarget {
    Status,
    Body(Vec<jsonpath::Segment>),
}

impl Modifier {
    pub fn target(&self) -> Result<ModifierTarget, InteractionError> {
        let segments = jsonpath::parse(&self.path)
            .map_err(|e| InteractionError::InvalidModifier(e.to_string()))?;
        match segments.split_first() {
            Some((jsonpath::Segment::Key(head), [])) if head == "status" => {
                Ok(ModifierTarget::Status)
            }
            Some((jsonpath::Segment::Key(head), rest)) if head == "body" => {
                Ok(ModifierTarget::Body(rest.to_vec()))
            }
            _ => Err(InteractionError::InvalidModifier(format!(
                "path '{}' must be '{STATUS_PATH}' or start with '$.body'",
                self.path
            ))),
        }
    }

    /// Status code carried by a status modifier.
    pub fn status_code(&self) -> Option<u16> {
        let code = match &self.value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }?;
        (100..=999).contains(&code).then_some(code as u16)
    }

    pub fn applies_to(&self, attempt: u64) -> bool {
        self.attempt.map_or(true, |a| a == attempt)
    }

    pub(crate) fn validate(&self) -> Result<(), InteractionError> {
        if self.interaction.is_empty() {
            return Err(InteractionError::InvalidModifier(
                "'interaction' is required".to_string(),
            ));
        }
        if self.attempt == Some(0) {
            return Err(InteractionError::InvalidModifier(
                "'attempt' is 1-based".to_string(),
            ));
        }
        let target = self.target()?;
        if let ModifierTarget::Body(segments) = &target {
            let oversized = segments.iter().any(|segment| {
                matches!(segment, jsonpath::Segment::Index(i) if *i > jsonpath::MAX_WRITE_INDEX)
            });
            if oversized {
                return Err(InteractionError::InvalidModifier(format!(
                    "array index in '{}' exceeds {}",
                    self.path,
                    jsonpath::MAX_WRITE_INDEX
                )));
            }
        }
        if target == ModifierTarget::Status && self.status_code().is_none() {
            return Err(InteractionError::InvalidModifier(format!(
                "'{}' is not a valid status code",
                self.value
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Interaction
// ============================================================================

/// One expected request template with its runtime state.
pub struct Interaction {
    pub(crate) description: String,
    pub(crate) alias: Option<String>,
    pub(crate) method: String,
    pub(crate) path: PathMatcher,
    pub(crate) definition: Value,
    pub(crate) constraints: DashMap<String, Constraint>,
    pub(crate) modifiers: ModifierSet,
    last_request: RwLock<Option<Arc<NormalizedRequest>>>,
    request_count: AtomicU64,
}

impl Interaction {
    pub(crate) fn new(
        description: String,
        alias: Option<String>,
        method: String,
        path: PathMatcher,
        definition: Value,
    ) -> Self {
        Self {
            description,
            alias: alias.filter(|a| !a.is_empty()),
            method,
            path,
            definition,
            constraints: DashMap::new(),
            modifiers: ModifierSet::new(),
            last_request: RwLock::new(None),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path_matcher(&self) -> &PathMatcher {
        &self.path
    }

    pub fn definition(&self) -> &Value {
        &self.definition
    }

    /// Whether this interaction is a candidate for `method` + `path`.
    pub fn accepts(&self, path: &str, method: &str) -> bool {
        self.method == method && self.path.matches(path)
    }

    /// Upsert a constraint; an existing constraint on the same path is replaced.
    pub fn add_constraint(&self, constraint: Constraint) -> Result<(), InteractionError> {
        constraint.validate()?;
        let key = constraint.key()?;
        self.constraints.insert(key, constraint);
        Ok(())
    }

    /// Snapshot of the registered constraints.
    pub fn constraints(&self) -> Vec<Constraint> {
        self.constraints
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn add_modifier(&self, modifier: Modifier) -> Result<(), InteractionError> {
        modifier.validate()?;
        self.modifiers.add(modifier)
    }

    pub fn modifiers(&self) -> Vec<Modifier> {
        self.modifiers.snapshot()
    }

    /// Record a request that satisfied this interaction's constraints.
    ///
    /// Concurrent matches each increment the counter exactly once; the
    /// `last_request` slot keeps whichever store completed last.
    pub fn store_request(&self, request: Arc<NormalizedRequest>) -> u64 {
        *self.last_request.write() = Some(request);
        self.request_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn last_request(&self) -> Option<Arc<NormalizedRequest>> {
        self.last_request.read().clone()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interaction")
            .field("description", &self.description)
            .field("alias", &self.alias)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("constraints", &self.constraints.len())
            .field("request_count", &self.request_count())
            .finish()
    }
}

/// Read-only summary used by diagnostics endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSummary {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub method: String,
    pub path: String,
    pub request_count: u64,
    pub constraints: Vec<Constraint>,
    pub modifiers: Vec<Modifier>,
}

impl From<&Interaction> for InteractionSummary {
    fn from(interaction: &Interaction) -> Self {
        let mut constraints = interaction.constraints();
        constraints.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            description: interaction.description.clone(),
            alias: interaction.alias.clone(),
            method: interaction.method.clone(),
            path: interaction.path.to_string(),
            request_count: interaction.request_count(),
            constraints,
            modifiers: interaction.modifiers(),
        }
    }
}
