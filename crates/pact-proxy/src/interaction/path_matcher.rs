//! Path matching for interaction templates.
//!
//! A template path is either matched literally or, when the template declares
//! a regex matching rule for the path, through the compiled pattern.

use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Compiled path matcher.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Literal path: `/api/users/1`
    Exact(String),
    /// Anchored regex: `^(?:/api/users/\d+)$`
    Regex(Arc<Regex>),
}

impl PathMatcher {
    pub fn exact(path: impl Into<String>) -> Self {
        PathMatcher::Exact(path.into())
    }

    /// Compile a regex matcher. Pact regexes must match the whole path, so
    /// the pattern is anchored.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        let anchored = format!("^(?:{pattern})$");
        Ok(PathMatcher::Regex(Arc::new(Regex::new(&anchored)?)))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Exact(value) => path == value,
            PathMatcher::Regex(regex) => regex.is_match(path),
        }
    }
}

impl fmt::Display for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathMatcher::Exact(value) => f.write_str(value),
            PathMatcher::Regex(regex) => f.write_str(regex.as_str()),
        }
    }
}
