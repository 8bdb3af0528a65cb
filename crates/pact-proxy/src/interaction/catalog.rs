//! Interaction catalog.
//!
//! Concurrent registry of interactions keyed by description and, when set,
//! by alias. Both keys share one `Arc<Interaction>`, so state recorded
//! through either key is visible through the other.

use super::definition::parse_interaction;
use super::types::{Constraint, Interaction, InteractionError, InteractionSummary, Modifier};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct Catalog {
    entries: DashMap<String, Arc<Interaction>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by description, and by alias when present.
    ///
    /// A replaced interaction's alias is dropped if it still points at the
    /// replaced entry, so a stale template is never reachable.
    pub fn store(&self, interaction: Arc<Interaction>) {
        let description = interaction.description().to_string();

        if let Some(previous) = self.entries.insert(description.clone(), interaction.clone()) {
            if let Some(old_alias) = previous.alias() {
                if Some(old_alias) != interaction.alias() {
                    self.entries
                        .remove_if(old_alias, |_, current| Arc::ptr_eq(current, &previous));
                }
            }
        }

        if let Some(alias) = interaction.alias() {
            self.entries.insert(alias.to_string(), interaction.clone());
        }
        debug!(interaction = %description, alias = ?interaction.alias(), "Stored interaction");
    }

    /// Exact lookup by description or alias.
    pub fn load(&self, key: &str) -> Option<Arc<Interaction>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Interactions accepting `method` + `path`, one per description.
    ///
    /// Candidates are collected before matching so no shard lock is held
    /// while regexes run. Order is unspecified.
    pub fn find_all(&self, path: &str, method: &str) -> Vec<Arc<Interaction>> {
        let candidates: Vec<Arc<Interaction>> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|interaction| interaction.accepts(path, method))
            .filter(|interaction| seen.insert(interaction.description().to_string()))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Whether every registered interaction has matched at least once.
    /// Vacuously true for an empty catalog.
    pub fn all_have_requests(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.value().request_count() >= 1)
    }

    /// Number of distinct interactions (aliases not counted twice).
    pub fn len(&self) -> usize {
        self.unique().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summaries(&self) -> Vec<InteractionSummary> {
        let mut summaries: Vec<InteractionSummary> = self
            .unique()
            .iter()
            .map(|interaction| InteractionSummary::from(interaction.as_ref()))
            .collect();
        summaries.sort_by(|a, b| a.description.cmp(&b.description));
        summaries
    }

    fn unique(&self) -> Vec<Arc<Interaction>> {
        let all: Vec<Arc<Interaction>> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut seen = HashSet::new();
        all.into_iter()
            .filter(|interaction| seen.insert(interaction.description().to_string()))
            .collect()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Parse a Pact interaction template and store it.
    pub fn register_interaction(
        &self,
        bytes: &[u8],
        alias: Option<&str>,
    ) -> Result<Arc<Interaction>, InteractionError> {
        let interaction = Arc::new(parse_interaction(bytes, alias)?);
        self.store(interaction.clone());
        info!(
            interaction = %interaction.description(),
            method = %interaction.method(),
            path = %interaction.path_matcher(),
            constraints = interaction.constraints.len(),
            "Registered interaction"
        );
        Ok(interaction)
    }

    /// Parse a constraint payload and attach it to its interaction.
    pub fn register_constraint(&self, bytes: &[u8]) -> Result<Constraint, InteractionError> {
        let constraint: Constraint = serde_json::from_slice(bytes)
            .map_err(|e| InteractionError::InvalidJson(e.to_string()))?;
        constraint.validate()?;

        let interaction = self
            .load(&constraint.interaction)
            .ok_or_else(|| InteractionError::UnknownInteraction(constraint.interaction.clone()))?;
        interaction.add_constraint(constraint.clone())?;
        info!(
            interaction = %interaction.description(),
            path = %constraint.path,
            source = ?constraint.source,
            "Registered constraint"
        );
        Ok(constraint)
    }

    /// Parse a modifier payload and attach it to its interaction.
    pub fn register_modifier(&self, bytes: &[u8]) -> Result<Modifier, InteractionError> {
        let modifier: Modifier = serde_json::from_slice(bytes)
            .map_err(|e| InteractionError::InvalidJson(e.to_string()))?;
        modifier.validate()?;

        let interaction = self
            .load(&modifier.interaction)
            .ok_or_else(|| InteractionError::UnknownInteraction(modifier.interaction.clone()))?;
        interaction.add_modifier(modifier.clone())?;
        info!(
            interaction = %interaction.description(),
            path = %modifier.path,
            attempt = ?modifier.attempt,
            "Registered modifier"
        );
        Ok(modifier)
    }
}
