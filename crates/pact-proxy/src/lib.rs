//! Intercepting reverse proxy for consumer-driven contract tests.
//!
//! A proxy sits between a consumer under test and a Pact mock server. Requests
//! matching a registered interaction are checked against its constraints,
//! forwarded to the mock server, and the response is optionally rewritten by
//! modifiers. Test code can block until an interaction has been hit.

pub mod admin_api;
pub mod config;
pub mod interaction;
pub mod jsonpath;
pub mod manager;
pub mod metrics;
pub mod notify;
pub mod proxy;
pub mod request;
