//! Proxy handlers: create, list, get and delete proxy instances.

use crate::admin_api::types::*;
use crate::manager::{ManagerError, ProxyConfig, ProxyManager};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, warn};

/// POST /proxies - Create a proxy
pub async fn handle_create<B>(req: Request<B>, manager: Arc<ProxyManager>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    let config: ProxyConfig = match serde_json::from_slice(&body) {
        Ok(c) => c,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid proxy JSON: {e}"),
            )
        }
    };

    match manager.create_proxy(config).await {
        Ok(proxy) => {
            info!("Created proxy on port {}", proxy.port);
            json_response(StatusCode::CREATED, &proxy)
        }
        Err(e) => {
            warn!("Failed to create proxy: {}", e);
            manager_error_response(&e)
        }
    }
}

/// GET /proxies - List proxies
pub fn handle_list(manager: Arc<ProxyManager>) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "proxies": manager.list() }),
    )
}

/// GET /proxies/:port
pub fn handle_get(port: u16, manager: Arc<ProxyManager>) -> Response<Full<Bytes>> {
    match manager.get(port) {
        Ok(proxy) => json_response(StatusCode::OK, &proxy),
        Err(e) => manager_error_response(&e),
    }
}

/// DELETE /proxies/:port
pub fn handle_delete(port: u16, manager: Arc<ProxyManager>) -> Response<Full<Bytes>> {
    match manager.delete_proxy(port) {
        Ok(proxy) => json_response(StatusCode::OK, &proxy),
        Err(e) => manager_error_response(&e),
    }
}

/// DELETE /proxies
pub fn handle_delete_all(manager: Arc<ProxyManager>) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "proxies": manager.delete_all() }),
    )
}

fn manager_error_response(error: &ManagerError) -> Response<Full<Bytes>> {
    let status = match error {
        ManagerError::NotFound(_) => StatusCode::NOT_FOUND,
        ManagerError::Bind { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        ManagerError::PortInUse(_)
        | ManagerError::InvalidAddress(_)
        | ManagerError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
    };
    error_response(status, &error.to_string())
}
