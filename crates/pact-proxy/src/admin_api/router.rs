//! Route dispatch logic for the Admin API.

use crate::admin_api::handlers::{proxies, system};
use crate::admin_api::types::{error_response, not_found};
use crate::manager::ProxyManager;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

/// Parsed admin route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdminRoute {
    /// GET /health
    Health,
    /// GET /metrics
    Metrics,
    /// GET/POST/DELETE /proxies
    Proxies,
    /// GET/DELETE /proxies/:port
    Proxy(u16),
}

impl AdminRoute {
    /// `Err(())` for a `/proxies/:port` path whose port does not parse.
    fn parse(path: &str) -> Option<Result<Self, ()>> {
        match path.trim_end_matches('/') {
            "/health" => Some(Ok(AdminRoute::Health)),
            "/metrics" => Some(Ok(AdminRoute::Metrics)),
            "/proxies" => Some(Ok(AdminRoute::Proxies)),
            other => other
                .strip_prefix("/proxies/")
                .map(|port| port.parse().map(AdminRoute::Proxy).map_err(|_| ())),
        }
    }
}

/// Main request router
pub async fn route_request<B>(
    req: Request<B>,
    manager: Arc<ProxyManager>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Admin API: {} {}", method, path);

    let route = match AdminRoute::parse(&path) {
        Some(Ok(route)) => route,
        Some(Err(())) => return Ok(error_response(StatusCode::BAD_REQUEST, "Invalid port number")),
        None => return Ok(not_found()),
    };

    let response = match (&method, route) {
        (&Method::GET, AdminRoute::Health) => system::handle_health(manager),
        (&Method::GET, AdminRoute::Metrics) => system::handle_metrics(manager),
        (&Method::GET, AdminRoute::Proxies) => proxies::handle_list(manager),
        (&Method::POST, AdminRoute::Proxies) => proxies::handle_create(req, manager).await,
        (&Method::DELETE, AdminRoute::Proxies) => proxies::handle_delete_all(manager),
        (&Method::GET, AdminRoute::Proxy(port)) => proxies::handle_get(port, manager),
        (&Method::DELETE, AdminRoute::Proxy(port)) => proxies::handle_delete(port, manager),
        _ => error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
    };
    Ok(response)
}
