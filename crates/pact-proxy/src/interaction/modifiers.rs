//! Response modifiers: status and body overrides gated by attempt number.

use super::types::{Interaction, InteractionError, Modifier, ModifierTarget};
use crate::jsonpath;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

/// Ordered set of modifiers for one interaction, keyed by canonical path.
///
/// Re-registering a path replaces the earlier modifier in place, so
/// application order stays the order in which paths were first registered.
/// The lock is held while responses are rewritten so a concurrent `add`
/// never observes a half-applied set.
#[derive(Debug, Default)]
pub struct ModifierSet {
    entries: RwLock<Vec<(String, Modifier)>>,
}

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, modifier: Modifier) -> Result<(), InteractionError> {
        let key = jsonpath::canonicalize(&modifier.path)
            .map_err(|e| InteractionError::InvalidModifier(e.to_string()))?;

        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = modifier,
            None => entries.push((key, modifier)),
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<Modifier> {
        self.entries.read().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Apply every eligible body modifier to `body`.
    ///
    /// Returns `None` when nothing applied or the body is not JSON.
    pub fn modify_body(&self, body: &[u8], attempt: u64) -> Option<Vec<u8>> {
        let entries = self.entries.read();
        let eligible: Vec<(&Modifier, Vec<jsonpath::Segment>)> = entries
            .iter()
            .filter(|(_, m)| m.applies_to(attempt))
            .filter_map(|(_, m)| match m.target() {
                Ok(ModifierTarget::Body(segments)) => Some((m, segments)),
                _ => None,
            })
            .collect();

        if eligible.is_empty() {
            return None;
        }

        let mut document: Value = match serde_json::from_slice(body) {
            Ok(document) => document,
            Err(e) => {
                warn!("Skipping body modifiers, response body is not JSON: {}", e);
                return None;
            }
        };

        let mut applied = 0;
        for (modifier, segments) in eligible {
            match jsonpath::set(&mut document, &segments, modifier.value.clone()) {
                Ok(()) => {
                    debug!(path = %modifier.path, attempt, "Applied body modifier");
                    applied += 1;
                }
                Err(e) => warn!("Body modifier '{}' not applied: {}", modifier.path, e),
            }
        }

        if applied == 0 {
            return None;
        }
        serde_json::to_vec(&document).ok()
    }

    /// Status override for `attempt`: the first eligible status modifier in
    /// registration order.
    pub fn modify_status_code(&self, attempt: u64) -> Option<u16> {
        self.entries
            .read()
            .iter()
            .map(|(_, m)| m)
            .filter(|m| m.applies_to(attempt))
            .filter(|m| matches!(m.target(), Ok(ModifierTarget::Status)))
            .find_map(Modifier::status_code)
    }
}

impl Interaction {
    /// Rewrite a response body using the modifiers eligible for the current
    /// request count.
    pub fn modify_body(&self, body: &[u8]) -> Option<Vec<u8>> {
        self.modifiers.modify_body(body, self.request_count())
    }

    /// Status override for the current request count, if any.
    pub fn modify_status_code(&self) -> Option<u16> {
        self.modifiers.modify_status_code(self.request_count())
    }
}
