//! Request handling for a proxy instance.
//!
//! Control requests (`/interactions...`, `/ready`) are served locally and the
//! Pact mock-service admin calls are passed straight to the target; every
//! other request goes through the interception pipeline:
//!
//! 1. collect and normalize the request
//! 2. match it against the catalog (rejected requests are never forwarded)
//! 3. forward it unchanged to the target
//! 4. rewrite the response with the matched interactions' modifiers

use super::forwarding::{error_response, Forwarder};
use super::headers::{
    ProxyHeadersExt, VALUE_JSON, VALUE_TRUE, X_PACT_PROXY_ALIAS, X_PACT_PROXY_FORWARD_ERROR,
    X_PACT_PROXY_INTERACTION, X_PACT_PROXY_MODIFIED, X_PACT_PROXY_REJECTED,
};
use super::state::ProxyState;
use crate::interaction::{Interaction, InteractionError};
use crate::metrics;
use crate::request::NormalizedRequest;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Control endpoints served by every proxy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlRoute {
    /// POST /interactions
    RegisterInteraction,
    /// DELETE /interactions
    ClearInteractions,
    /// GET /interactions
    ListInteractions,
    /// POST /interactions/constraints
    RegisterConstraint,
    /// POST /interactions/modifiers
    RegisterModifier,
    /// GET /interactions/wait
    Wait,
    /// GET /ready
    Ready,
    /// Pact mock-service admin calls (verification, pact writing, session
    /// reset), forwarded to the target without matching
    MockService,
}

impl ControlRoute {
    fn parse(method: &Method, path: &str) -> Option<Self> {
        match (method, path.trim_end_matches('/')) {
            (&Method::POST, "/interactions") => Some(ControlRoute::RegisterInteraction),
            (&Method::DELETE, "/interactions") => Some(ControlRoute::ClearInteractions),
            (&Method::GET, "/interactions") => Some(ControlRoute::ListInteractions),
            (&Method::POST, "/interactions/constraints") => Some(ControlRoute::RegisterConstraint),
            (&Method::POST, "/interactions/modifiers") => Some(ControlRoute::RegisterModifier),
            (&Method::GET, "/interactions/wait") => Some(ControlRoute::Wait),
            (&Method::GET, "/ready") => Some(ControlRoute::Ready),
            (&Method::GET, "/interactions/verification")
            | (&Method::PUT, "/interactions")
            | (&Method::POST, "/pact")
            | (&Method::DELETE, "/session") => Some(ControlRoute::MockService),
            _ => None,
        }
    }
}

/// Handles requests for one proxy instance.
pub struct ProxyHandler {
    state: ProxyState,
    forwarder: Arc<dyn Forwarder>,
}

impl ProxyHandler {
    pub fn new(state: ProxyState, forwarder: Arc<dyn Forwarder>) -> Self {
        Self { state, forwarder }
    }

    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    pub fn target(&self) -> &str {
        self.forwarder.target()
    }

    /// Handle one request. Never fails: every error becomes a response.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        debug!("Proxy: {} {}", parts.method, parts.uri);

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                metrics::record_request(parts.method.as_str(), "bad_request");
                return error_response(StatusCode::BAD_REQUEST, "failed to read request body");
            }
        };

        match ControlRoute::parse(&parts.method, parts.uri.path()) {
            Some(ControlRoute::RegisterInteraction) => self.register_interaction(parts, body).await,
            Some(ControlRoute::ClearInteractions) => {
                self.state.clear_all();
                self.forward_control(parts, body).await
            }
            Some(ControlRoute::ListInteractions) => {
                json_response(StatusCode::OK, &self.state.summaries())
            }
            Some(ControlRoute::RegisterConstraint) => {
                registration_response(self.state.register_constraint(&body))
            }
            Some(ControlRoute::RegisterModifier) => {
                registration_response(self.state.register_modifier(&body))
            }
            Some(ControlRoute::Wait) => self.wait(parts.uri.query()).await,
            Some(ControlRoute::Ready) => json_response(
                StatusCode::OK,
                &serde_json::json!({"status": "ready", "target": self.target()}),
            ),
            Some(ControlRoute::MockService) => self.forward_control(parts, body).await,
            None => self.intercept(parts, body).await,
        }
    }

    // ========================================================================
    // Control endpoints
    // ========================================================================

    async fn register_interaction(&self, parts: Parts, body: Bytes) -> Response<Full<Bytes>> {
        let alias = query_param(parts.uri.query(), "alias").or_else(|| {
            parts
                .headers
                .get(&X_PACT_PROXY_ALIAS)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

        if let Err(e) = self.state.register_interaction(&body, alias.as_deref()) {
            warn!("Rejected interaction registration: {}", e);
            return error_response(status_for(&e), &e.to_string());
        }
        self.forward_control(parts, body).await
    }

    /// Forward a control request to the target as-is, without interception.
    async fn forward_control(&self, parts: Parts, body: Bytes) -> Response<Full<Bytes>> {
        match self.forwarder.forward(Request::from_parts(parts, body)).await {
            Ok(response) => response.map(Full::new),
            Err(e) => {
                error!("Failed to forward control request to {}: {}", self.target(), e);
                forward_error_response(&e.to_string())
            }
        }
    }

    async fn wait(&self, query: Option<&str>) -> Response<Full<Bytes>> {
        let identifier = query_param(query, "interaction").filter(|i| !i.is_empty());
        let count = match query_param(query, "count").map(|c| c.parse::<u64>()) {
            None => 1,
            Some(Ok(count)) => count,
            Some(Err(_)) => {
                return error_response(StatusCode::BAD_REQUEST, "'count' must be a non-negative integer")
            }
        };
        let timeout = match query_param(query, "timeout").map(|t| t.parse::<u64>()) {
            None => None,
            Some(Ok(ms)) => Some(Duration::from_millis(ms)),
            Some(Err(_)) => {
                return error_response(StatusCode::BAD_REQUEST, "'timeout' must be milliseconds")
            }
        };

        match self
            .state
            .wait_for(identifier.as_deref(), count, timeout)
            .await
        {
            Ok(true) => json_response(
                StatusCode::OK,
                &WaitResult {
                    interaction: identifier,
                    count,
                    satisfied: true,
                },
            ),
            Ok(false) => {
                let target = identifier
                    .as_deref()
                    .map(|i| format!("{count} request(s) to '{i}'"))
                    .unwrap_or_else(|| "a request to every interaction".to_string());
                info!("Timed out waiting for {}", target);
                error_response(
                    StatusCode::REQUEST_TIMEOUT,
                    &format!("timed out waiting for {target}"),
                )
            }
            Err(e) => error_response(status_for(&e), &e.to_string()),
        }
    }

    // ========================================================================
    // Interception
    // ========================================================================

    async fn intercept(&self, parts: Parts, body: Bytes) -> Response<Full<Bytes>> {
        let method = parts.method.as_str().to_string();
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let normalized =
            NormalizedRequest::from_parts(parts.uri.path(), parts.uri.query(), content_type, &body);

        let matched = match self.state.intercept(&method, normalized) {
            Ok(matched) => matched,
            Err(rejection) => {
                warn!("Rejected {} {}: {}", method, parts.uri.path(), rejection);
                metrics::record_request(&method, rejection.outcome());
                let mut response = error_response(StatusCode::BAD_REQUEST, &rejection.to_string());
                response.set_header(&X_PACT_PROXY_REJECTED, &VALUE_TRUE);
                return response;
            }
        };

        let started = Instant::now();
        let forwarded = self.forwarder.forward(Request::from_parts(parts, body)).await;
        metrics::record_forward_duration(&method, started.elapsed().as_secs_f64() * 1000.0);

        match forwarded {
            Ok(response) => {
                metrics::record_request(&method, "matched");
                rewrite_response(response, &matched)
            }
            Err(e) => {
                error!("Failed to forward request to {}: {}", self.target(), e);
                metrics::record_request(&method, "forward_error");
                forward_error_response(&e.to_string())
            }
        }
    }
}

/// Apply the matched interactions' modifiers to a target response.
///
/// Body modifiers run first, then the first status override found. The
/// request counts read here are the counts at response time.
pub fn rewrite_response(
    response: Response<Bytes>,
    matched: &[Arc<Interaction>],
) -> Response<Full<Bytes>> {
    let (mut parts, mut body) = response.into_parts();
    let mut modified = false;

    for interaction in matched {
        if let Some(rewritten) = interaction.modify_body(&body) {
            debug!(interaction = %interaction.description(), "Rewrote response body");
            metrics::record_modifier("body");
            body = Bytes::from(rewritten);
            modified = true;
        }
    }
    if modified {
        parts.headers.remove(TRANSFER_ENCODING);
        parts
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    }

    if let Some(code) = matched.iter().find_map(|i| i.modify_status_code()) {
        match StatusCode::from_u16(code) {
            Ok(status) => {
                debug!(status = code, "Overrode response status");
                metrics::record_modifier("status");
                parts.status = status;
                modified = true;
            }
            Err(_) => warn!("Ignoring invalid status override {}", code),
        }
    }

    let mut response = Response::from_parts(parts, Full::new(body));
    let descriptions: Vec<&str> = matched.iter().map(|i| i.description()).collect();
    let joined = descriptions.join(", ");
    if !response.set_header_value(&X_PACT_PROXY_INTERACTION, &joined) {
        debug!("Interaction header dropped, not a valid header value: {:?}", joined);
    }
    if modified {
        response.set_header(&X_PACT_PROXY_MODIFIED, &VALUE_TRUE);
    }
    response
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Serialize)]
struct WaitResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    interaction: Option<String>,
    count: u64,
    satisfied: bool,
}

fn status_for(error: &InteractionError) -> StatusCode {
    match error {
        InteractionError::UnknownInteraction(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn registration_response<T: Serialize>(result: Result<T, InteractionError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => json_response(StatusCode::OK, &value),
        Err(e) => {
            warn!("Rejected registration: {}", e);
            error_response(status_for(&e), &e.to_string())
        }
    }
}

fn forward_error_response(message: &str) -> Response<Full<Bytes>> {
    let mut response = error_response(StatusCode::BAD_GATEWAY, message);
    response.set_header(&X_PACT_PROXY_FORWARD_ERROR, &VALUE_TRUE);
    response
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response.set_header(&CONTENT_TYPE, &VALUE_JSON);
            response
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// First value of `name` in a query string, URL-decoded.
pub(crate) fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key != name {
            return None;
        }
        let value = value.replace('+', " ");
        Some(
            urlencoding::decode(&value)
                .map(|v| v.into_owned())
                .unwrap_or(value),
        )
    })
}

#[cfg(test)]
mod route_tests {
    use super::*;

    #[test]
    fn test_control_route_parse() {
        assert_eq!(
            ControlRoute::parse(&Method::POST, "/interactions"),
            Some(ControlRoute::RegisterInteraction)
        );
        assert_eq!(
            ControlRoute::parse(&Method::DELETE, "/interactions/"),
            Some(ControlRoute::ClearInteractions)
        );
        assert_eq!(
            ControlRoute::parse(&Method::GET, "/interactions/wait"),
            Some(ControlRoute::Wait)
        );
        for (method, path) in [
            (Method::GET, "/interactions/verification"),
            (Method::PUT, "/interactions"),
            (Method::POST, "/pact"),
            (Method::DELETE, "/session/"),
        ] {
            assert_eq!(
                ControlRoute::parse(&method, path),
                Some(ControlRoute::MockService)
            );
        }
        assert_eq!(ControlRoute::parse(&Method::GET, "/pact"), None);
        assert_eq!(ControlRoute::parse(&Method::GET, "/users"), None);
    }

    #[test]
    fn test_query_param() {
        let query = Some("interaction=create%20user&count=3&alias=a+b");
        assert_eq!(query_param(query, "interaction").as_deref(), Some("create user"));
        assert_eq!(query_param(query, "count").as_deref(), Some("3"));
        assert_eq!(query_param(query, "alias").as_deref(), Some("a b"));
        assert_eq!(query_param(query, "timeout"), None);
        assert_eq!(query_param(None, "count"), None);
    }
}
