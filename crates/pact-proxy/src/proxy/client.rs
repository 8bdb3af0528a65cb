//! HTTP client creation and configuration.
//!
//! One pooled client is shared by every proxy instance; each forwards to its
//! own target over plain HTTP/1.1.

use crate::config::ConnectionPoolConfig;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::info;

/// Type alias for the HTTP client used by the proxy.
pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Create a shared HTTP client with connection pooling.
pub fn create_http_client(config: &ConnectionPoolConfig) -> HttpClient {
    let mut http_connector = HttpConnector::new();
    http_connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
    http_connector.set_nodelay(true);

    let http_client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .pool_max_idle_per_host(config.max_idle_per_host)
        .build(http_connector);

    info!(
        "Connection pool configured (HTTP/1.1): max_idle={}, idle_timeout={}s, connect_timeout={}s",
        config.max_idle_per_host, config.idle_timeout_secs, config.connect_timeout_secs
    );

    http_client
}
