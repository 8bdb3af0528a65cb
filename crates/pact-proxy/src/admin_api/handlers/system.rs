//! System handlers: health and metrics.

use crate::admin_api::types::*;
use crate::manager::ProxyManager;
use crate::metrics::collect_metrics;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;

/// GET /health - Health check
pub fn handle_health(manager: Arc<ProxyManager>) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({"status": "ok", "proxies": manager.count()}),
    )
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics(manager: Arc<ProxyManager>) -> Response<Full<Bytes>> {
    let mut metrics = collect_metrics();
    metrics.push_str("# HELP pact_proxy_proxies Number of running proxies\n");
    metrics.push_str("# TYPE pact_proxy_proxies gauge\n");
    metrics.push_str(&format!("pact_proxy_proxies {}\n", manager.count()));

    build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_health() {
        let resp = handle_health(Arc::new(ProxyManager::default()));
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_handle_metrics() {
        let resp = handle_metrics(Arc::new(ProxyManager::default()));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/plain; version=0.0.4"
        );
    }
}
