//! Request forwarding to the proxy target.
//!
//! Matched requests are relayed with their original method, path, query,
//! headers (except `host`) and body. The full response is collected so the
//! modifier engine can rewrite it before it is returned.

use super::client::HttpClient;
use super::headers::VALUE_JSON;
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Request, Response, StatusCode, Uri};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid target '{0}'")]
    InvalidUri(String),
    #[error("request to target failed: {0}")]
    Request(String),
    #[error("failed to read target response: {0}")]
    Body(String),
}

/// Relays a buffered request to the target and returns the buffered response.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: Request<Bytes>) -> Result<Response<Bytes>, ForwardError>;

    /// Base URI requests are forwarded to.
    fn target(&self) -> &str;
}

/// `Forwarder` backed by the shared pooled hyper client.
pub struct HttpForwarder {
    client: HttpClient,
    target: String,
}

impl HttpForwarder {
    pub fn new(client: HttpClient, target: &str) -> Result<Self, ForwardError> {
        let target = normalize_target(target)?;
        Ok(Self { client, target })
    }
}

/// Validate a target base URI and strip any trailing slash.
pub fn normalize_target(target: &str) -> Result<String, ForwardError> {
    let uri: Uri = target
        .parse()
        .map_err(|_| ForwardError::InvalidUri(target.to_string()))?;
    if uri.scheme_str() != Some("http") || uri.authority().is_none() {
        return Err(ForwardError::InvalidUri(target.to_string()));
    }
    Ok(target.trim_end_matches('/').to_string())
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, request: Request<Bytes>) -> Result<Response<Bytes>, ForwardError> {
        let (parts, body) = request.into_parts();
        let upstream_path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let full_uri = format!("{}{}", self.target, upstream_path);

        debug!("Forwarding to: {}", full_uri);

        let mut upstream_req = Request::builder().method(parts.method).uri(&full_uri);

        // Copy headers (skip host)
        for (key, value) in parts.headers.iter() {
            if key != HOST {
                upstream_req = upstream_req.header(key, value);
            }
        }

        let upstream_req = upstream_req
            .body(Full::new(body))
            .map_err(|_| ForwardError::InvalidUri(full_uri.clone()))?;

        let upstream_response = self
            .client
            .request(upstream_req)
            .await
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        let (parts, body) = upstream_response.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map_err(|e| ForwardError::Body(e.to_string()))?
            .to_bytes();
        Ok(Response::from_parts(parts, body_bytes))
    }

    fn target(&self) -> &str {
        &self.target
    }
}

/// JSON error response: `{"error": "<message>"}`.
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, VALUE_JSON.clone());
    response
}
