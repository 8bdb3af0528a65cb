//! Interaction templates and their runtime state.
//!
//! This module provides:
//! - `Catalog`: concurrent registry keyed by description and alias
//! - `Interaction`: one expected request template with its counters
//! - `Constraint` / `Modifier`: rules attached to an interaction at runtime
//!
//! ## Module Structure
//!
//! - `types`: Interaction, Constraint, Modifier and errors
//! - `path_matcher`: exact or regex path matching
//! - `definition`: Pact template parsing and default constraints
//! - `constraints`: constraint evaluation and printf-style formatting
//! - `modifiers`: attempt-gated response rewriting
//! - `catalog`: the registry and registration entry points

mod catalog;
mod constraints;
mod definition;
mod modifiers;
mod path_matcher;
mod types;


pub use catalog::Catalog;
pub use constraints::{format_values, render};
pub use definition::parse_interaction;
pub use modifiers::ModifierSet;
pub use path_matcher::PathMatcher;
pub use types::{
    Constraint, Interaction, InteractionError, InteractionSummary, Modifier, ModifierTarget,
    STATUS_PATH,
};
