//! Per-proxy interception state.
//!
//! `ProxyState` ties the catalog and the notifier together and implements
//! the matching half of the pipeline: find candidates, evaluate their
//! constraints, record the request on every interaction that matched and
//! wake waiters once.

use crate::interaction::{
    Catalog, Constraint, Interaction, InteractionError, InteractionSummary, Modifier,
};
use crate::metrics;
use crate::notify::{retry_for, Notifier, RetryPolicy};
use crate::request::NormalizedRequest;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Why a request was not forwarded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("no interaction found for {method} {path}")]
    NoInteraction { method: String, path: String },
    #[error("constraints do not match for {method} {path}: {}", .violations.join("; "))]
    ConstraintsFailed {
        method: String,
        path: String,
        violations: Vec<String>,
    },
}

impl Rejection {
    /// Label used for the requests metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            Rejection::NoInteraction { .. } => "no_interaction",
            Rejection::ConstraintsFailed { .. } => "constraints_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyState {
    catalog: Arc<Catalog>,
    notifier: Arc<Notifier>,
    retry: RetryPolicy,
}

impl ProxyState {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            catalog: Arc::new(Catalog::new()),
            notifier: Arc::new(Notifier::new()),
            retry,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn register_interaction(
        &self,
        bytes: &[u8],
        alias: Option<&str>,
    ) -> Result<Arc<Interaction>, InteractionError> {
        self.catalog.register_interaction(bytes, alias)
    }

    pub fn register_constraint(&self, bytes: &[u8]) -> Result<Constraint, InteractionError> {
        self.catalog.register_constraint(bytes)
    }

    pub fn register_modifier(&self, bytes: &[u8]) -> Result<Modifier, InteractionError> {
        self.catalog.register_modifier(bytes)
    }

    /// Drop every interaction. Idempotent.
    pub fn clear_all(&self) {
        self.catalog.clear();
        info!("Cleared all interactions");
    }

    pub fn summaries(&self) -> Vec<InteractionSummary> {
        self.catalog.summaries()
    }

    /// Match a normalized request against the catalog.
    ///
    /// On success every matching interaction has recorded the request and
    /// waiters have been notified once. The result is sorted by description.
    pub fn intercept(
        &self,
        method: &str,
        request: NormalizedRequest,
    ) -> Result<Vec<Arc<Interaction>>, Rejection> {
        let path = request.path().to_string();
        let candidates = self.catalog.find_all(&path, method);
        if candidates.is_empty() {
            return Err(Rejection::NoInteraction {
                method: method.to_string(),
                path,
            });
        }
        debug!(method, path = %path, candidates = candidates.len(), "Evaluating candidates");

        let mut matched = Vec::new();
        let mut violations = Vec::new();
        for candidate in candidates {
            let (ok, messages) = candidate.evaluate(&request, &self.catalog);
            if ok {
                matched.push(candidate);
            } else {
                metrics::record_constraint_violations(candidate.description(), messages.len());
                violations.extend(
                    messages
                        .into_iter()
                        .map(|message| format!("{}: {}", candidate.description(), message)),
                );
            }
        }

        if matched.is_empty() {
            violations.sort();
            return Err(Rejection::ConstraintsFailed {
                method: method.to_string(),
                path,
                violations,
            });
        }

        let request = Arc::new(request);
        for interaction in &matched {
            let count = interaction.store_request(request.clone());
            info!(
                interaction = %interaction.description(),
                count,
                "Matched {} {}", method, path
            );
        }
        self.notifier.notify();

        matched.sort_by(|a, b| a.description().cmp(b.description()));
        Ok(matched)
    }

    /// Block until `identifier` has at least `count` requests, or until
    /// every interaction has at least one when no identifier is given.
    ///
    /// `timeout` lowers the configured ceiling, never raises it. Returns
    /// `Ok(false)` on timeout.
    pub async fn wait_for(
        &self,
        identifier: Option<&str>,
        count: u64,
        timeout: Option<Duration>,
    ) -> Result<bool, InteractionError> {
        let policy = match timeout {
            Some(timeout) => self.retry.with_timeout(timeout),
            None => self.retry,
        };

        let satisfied = match identifier {
            Some(identifier) => {
                let interaction = self
                    .catalog
                    .load(identifier)
                    .ok_or_else(|| InteractionError::UnknownInteraction(identifier.to_string()))?;
                let notifier = self.notifier.clone();
                retry_for(policy, |slice| {
                    let interaction = interaction.clone();
                    let notifier = notifier.clone();
                    async move {
                        notifier
                            .wait_unless(slice, || interaction.request_count() >= count)
                            .await
                    }
                })
                .await
            }
            None => {
                let catalog = self.catalog.clone();
                let notifier = self.notifier.clone();
                retry_for(policy, |slice| {
                    let catalog = catalog.clone();
                    let notifier = notifier.clone();
                    async move {
                        notifier
                            .wait_unless(slice, || catalog.all_have_requests())
                            .await
                    }
                })
                .await
            }
        };

        metrics::record_wait(satisfied);
        debug!(identifier = ?identifier, count, satisfied, "Wait finished");
        Ok(satisfied)
    }
}

impl Default for ProxyState {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
