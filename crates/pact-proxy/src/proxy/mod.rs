//! Proxy pipeline module.
//!
//! This module provides the intercepting proxy with support for:
//! - Interaction registration, constraints and modifiers over HTTP
//! - Fail-closed interception: unmatched requests never reach the target
//! - Attempt-gated response rewriting (status and body)
//! - Blocking waits on interaction request counts
//!
//! # Module Structure
//!
//! - `state` - ProxyState: catalog, notifier and the matching step
//! - `handler` - Control routes and the interception pipeline
//! - `server` - ProxyServer accept loop
//! - `forwarding` - Forwarder trait and the hyper client forwarder
//! - `client` - HTTP client creation and configuration
//! - `headers` - pact-proxy response headers

mod client;
mod forwarding;
mod handler;
mod headers;
mod server;
mod state;

#[cfg(test)]
mod tests;

pub use client::{create_http_client, HttpClient};
pub use forwarding::{error_response, normalize_target, ForwardError, Forwarder, HttpForwarder};
pub use handler::{rewrite_response, ProxyHandler};
pub use headers::{
    X_PACT_PROXY_ALIAS, X_PACT_PROXY_FORWARD_ERROR, X_PACT_PROXY_INTERACTION,
    X_PACT_PROXY_MODIFIED, X_PACT_PROXY_REJECTED,
};
pub use server::ProxyServer;
pub use state::{ProxyState, Rejection};
