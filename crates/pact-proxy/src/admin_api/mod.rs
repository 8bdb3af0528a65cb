//! Admin REST API for pact-proxy.
//!
//! This module provides a REST API for:
//! - Creating, deleting, and listing proxy instances
//! - Health and Prometheus metrics endpoints
//!
//! The API listens on a configurable port (default: 8080).

mod handlers;
mod router;
mod server;
mod types;

pub use router::route_request;
pub use server::AdminApiServer;
