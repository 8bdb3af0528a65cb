//! Tests for the proxy pipeline.
//!
//! A mock `Forwarder` stands in for the target so the pipeline can be
//! exercised without sockets.

use super::*;
use crate::notify::RetryPolicy;
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_LENGTH;
use hyper::{Method, Request, Response, StatusCode};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Records forwarded requests and answers with a fixed JSON body.
struct MockForwarder {
    seen: Mutex<Vec<(Method, String, Bytes)>>,
    body: Value,
    fail: bool,
}

impl MockForwarder {
    fn new(body: Value) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            body,
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            body: Value::Null,
            fail: true,
        })
    }

    fn seen(&self) -> Vec<(Method, String, Bytes)> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Forwarder for MockForwarder {
    async fn forward(&self, request: Request<Bytes>) -> Result<Response<Bytes>, ForwardError> {
        let (parts, body) = request.into_parts();
        self.seen
            .lock()
            .push((parts.method, parts.uri.to_string(), body));
        if self.fail {
            return Err(ForwardError::Request("connection refused".to_string()));
        }
        let body = Bytes::from(serde_json::to_vec(&self.body).unwrap());
        Ok(Response::builder()
            .status(200)
            .header("content-type", "application/json")
            .header(CONTENT_LENGTH, body.len())
            .body(body)
            .unwrap())
    }

    fn target(&self) -> &str {
        "http://mock"
    }
}

fn handler_with(forwarder: Arc<MockForwarder>) -> ProxyHandler {
    let policy = RetryPolicy {
        interval: Duration::from_millis(50),
        timeout: Duration::from_secs(2),
    };
    ProxyHandler::new(ProxyState::new(policy), forwarder)
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Full<Bytes>> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(serde_json::to_vec(&body).unwrap())))
            .unwrap(),
        None => builder.body(Full::new(Bytes::new())).unwrap(),
    }
}

async fn body_json(response: Response<Full<Bytes>>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_user() -> Value {
    json!({
        "description": "create user",
        "request": {"method": "POST", "path": "/users", "body": {"name": "any"}},
        "response": {"status": 201}
    })
}

async fn register(handler: &ProxyHandler, template: Value) {
    let response = handler
        .handle(request(Method::POST, "/interactions", Some(template)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Control endpoints
// ============================================================================

#[tokio::test]
async fn test_register_interaction_is_forwarded() {
    let forwarder = MockForwarder::new(json!({}));
    let handler = handler_with(forwarder.clone());

    register(&handler, create_user()).await;

    let seen = forwarder.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Method::POST);
    assert_eq!(seen[0].1, "/interactions");
    assert!(handler.state().catalog().load("create user").is_some());
}

#[tokio::test]
async fn test_register_interaction_alias_from_query_and_header() {
    let handler = handler_with(MockForwarder::new(json!({})));

    handler
        .handle(request(Method::POST, "/interactions?alias=creator", Some(create_user())))
        .await;
    assert!(handler.state().catalog().load("creator").is_some());

    let mut req = request(
        Method::POST,
        "/interactions",
        Some(json!({"description": "list", "request": {"method": "GET", "path": "/users"}})),
    );
    req.headers_mut()
        .insert(&X_PACT_PROXY_ALIAS, "lister".parse().unwrap());
    handler.handle(req).await;
    assert!(handler.state().catalog().load("lister").is_some());
}

#[tokio::test]
async fn test_register_invalid_interaction_is_not_forwarded() {
    let forwarder = MockForwarder::new(json!({}));
    let handler = handler_with(forwarder.clone());

    let response = handler
        .handle(request(
            Method::POST,
            "/interactions",
            Some(json!({"description": "x", "request": {"path": "/"}})),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(forwarder.seen().is_empty());
    assert!(handler.state().catalog().is_empty());
}

#[tokio::test]
async fn test_constraint_for_unknown_interaction_is_404() {
    let handler = handler_with(MockForwarder::new(json!({})));
    let response = handler
        .handle(request(
            Method::POST,
            "/interactions/constraints",
            Some(json!({"interaction": "ghost", "path": "$.body.a", "values": ["x"]})),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clear_twice() {
    let forwarder = MockForwarder::new(json!({}));
    let handler = handler_with(forwarder.clone());
    register(&handler, create_user()).await;

    for _ in 0..2 {
        let response = handler
            .handle(request(Method::DELETE, "/interactions", None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(handler.state().catalog().is_empty());
    }
    assert_eq!(forwarder.seen().len(), 3);
}

#[tokio::test]
async fn test_list_interactions() {
    let handler = handler_with(MockForwarder::new(json!({})));
    register(&handler, create_user()).await;

    let response = handler
        .handle(request(Method::GET, "/interactions", None))
        .await;
    let body = body_json(response).await;
    assert_eq!(body[0]["description"], "create user");
    assert_eq!(body[0]["requestCount"], 0);
}

#[tokio::test]
async fn test_mock_service_admin_calls_pass_through() {
    let forwarder = MockForwarder::new(json!({"ok": true}));
    let handler = handler_with(forwarder.clone());
    register(&handler, create_user()).await;

    let calls = [
        (Method::GET, "/interactions/verification"),
        (Method::PUT, "/interactions"),
        (Method::POST, "/pact"),
        (Method::DELETE, "/session"),
    ];
    for (method, path) in calls.iter() {
        let response = handler.handle(request(method.clone(), path, None)).await;
        assert_eq!(response.status(), StatusCode::OK, "{method} {path}");
        assert!(response.headers().get(&X_PACT_PROXY_REJECTED).is_none());
    }

    let seen = forwarder.seen();
    assert_eq!(seen.len(), 1 + calls.len());
    for ((method, path), (seen_method, seen_uri, _)) in calls.iter().zip(&seen[1..]) {
        assert_eq!(seen_method, method);
        assert_eq!(seen_uri, path);
    }
    assert_eq!(
        handler.state().catalog().load("create user").unwrap().request_count(),
        0
    );
}

// ============================================================================
// Interception
// ============================================================================

#[tokio::test]
async fn test_percent_encoded_path_matches_template() {
    let forwarder = MockForwarder::new(json!({}));
    let handler = handler_with(forwarder.clone());
    register(
        &handler,
        json!({
            "description": "get john",
            "request": {"method": "GET", "path": "/users/john smith"}
        }),
    )
    .await;

    let response = handler
        .handle(request(Method::GET, "/users/john%20smith", None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(forwarder.seen()[1].1, "/users/john%20smith");
    assert_eq!(
        handler.state().catalog().load("get john").unwrap().request_count(),
        1
    );
}

#[tokio::test]
async fn test_oversized_modifier_index_is_rejected() {
    let handler = handler_with(MockForwarder::new(json!({"a": []})));
    register(&handler, create_user()).await;

    let response = handler
        .handle(request(
            Method::POST,
            "/interactions/modifiers",
            Some(json!({"interaction": "create user", "path": "$.body.a[18446744073709551615]", "value": 1})),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = handler
        .handle(request(Method::POST, "/users", Some(json!({"name": "any"}))))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"a": []}));
}

#[tokio::test]
async fn test_description_not_valid_as_header_is_skipped() {
    let handler = handler_with(MockForwarder::new(json!({})));
    register(
        &handler,
        json!({
            "description": "line\nbreak",
            "request": {"method": "GET", "path": "/odd"}
        }),
    )
    .await;

    let response = handler.handle(request(Method::GET, "/odd", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(&X_PACT_PROXY_INTERACTION).is_none());
}

#[tokio::test]
async fn test_matched_request_is_forwarded_and_tagged() {
    let forwarder = MockForwarder::new(json!({"id": 1}));
    let handler = handler_with(forwarder.clone());
    register(&handler, create_user()).await;

    let response = handler
        .handle(request(Method::POST, "/users?x=1", Some(json!({"name": "any"}))))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(&X_PACT_PROXY_INTERACTION).unwrap(),
        "create user"
    );
    assert!(response.headers().get(&X_PACT_PROXY_MODIFIED).is_none());

    let seen = forwarder.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].1, "/users?x=1");
    assert_eq!(seen[1].2, Bytes::from(r#"{"name":"any"}"#));
    assert_eq!(
        handler.state().catalog().load("create user").unwrap().request_count(),
        1
    );
}

#[tokio::test]
async fn test_no_interaction_is_rejected() {
    let forwarder = MockForwarder::new(json!({}));
    let handler = handler_with(forwarder.clone());

    let response = handler
        .handle(request(Method::GET, "/unknown", None))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers().get(&X_PACT_PROXY_REJECTED).unwrap(), "true");
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("no interaction found"));
    assert!(forwarder.seen().is_empty());
}

#[tokio::test]
async fn test_constraint_mismatch_is_rejected() {
    let forwarder = MockForwarder::new(json!({}));
    let handler = handler_with(forwarder.clone());
    register(&handler, create_user()).await;

    let response = handler
        .handle(request(Method::POST, "/users", Some(json!({"name": "bob"}))))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("constraints do not match"));
    assert!(error.contains("expected 'any' but got 'bob'"));
    assert_eq!(forwarder.seen().len(), 1);
    assert_eq!(
        handler.state().catalog().load("create user").unwrap().request_count(),
        0
    );
}

#[tokio::test]
async fn test_forward_error_is_502() {
    let handler = handler_with(MockForwarder::failing());
    handler
        .state()
        .register_interaction(&serde_json::to_vec(&create_user()).unwrap(), None)
        .unwrap();

    let response = handler
        .handle(request(Method::POST, "/users", Some(json!({"name": "any"}))))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.headers().get(&X_PACT_PROXY_FORWARD_ERROR).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_status_modifier_by_attempt() {
    let handler = handler_with(MockForwarder::new(json!({"id": 1})));
    register(&handler, create_user()).await;
    let response = handler
        .handle(request(
            Method::POST,
            "/interactions/modifiers",
            Some(json!({"interaction": "create user", "path": "$.status", "value": 503, "attempt": 2})),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = handler
            .handle(request(Method::POST, "/users", Some(json!({"name": "any"}))))
            .await;
        statuses.push(response.status().as_u16());
    }
    assert_eq!(statuses, vec![200, 503, 200]);
}

#[tokio::test]
async fn test_body_modifier_recomputes_content_length() {
    let handler = handler_with(MockForwarder::new(json!({"name": "sam", "id": 1})));
    register(&handler, create_user()).await;
    handler
        .handle(request(
            Method::POST,
            "/interactions/modifiers",
            Some(json!({"interaction": "create user", "path": "$.body.name", "value": "jane-doe"})),
        ))
        .await;

    let response = handler
        .handle(request(Method::POST, "/users", Some(json!({"name": "any"}))))
        .await;
    assert_eq!(response.headers().get(&X_PACT_PROXY_MODIFIED).unwrap(), "true");
    let length: usize = response
        .headers()
        .get(CONTENT_LENGTH)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(length, bytes.len());
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"name": "jane-doe", "id": 1}));
}

#[tokio::test]
async fn test_sourced_constraint_through_pipeline() {
    let handler = handler_with(MockForwarder::new(json!({})));
    register(&handler, create_user()).await;
    register(
        &handler,
        json!({"description": "get user", "request": {"method": "GET", "path": "/users/by-name"}}),
    )
    .await;
    handler
        .handle(request(
            Method::POST,
            "/interactions/constraints",
            Some(json!({
                "interaction": "get user",
                "path": "$.query.name",
                "source": "create user",
                "values": ["$.body.name"]
            })),
        ))
        .await;

    let response = handler
        .handle(request(Method::GET, "/users/by-name?name=any", None))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("no requests"));

    handler
        .handle(request(Method::POST, "/users", Some(json!({"name": "any"}))))
        .await;
    let response = handler
        .handle(request(Method::GET, "/users/by-name?name=any", None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Waiting
// ============================================================================

#[tokio::test]
async fn test_wait_returns_when_count_reached() {
    let handler = Arc::new(handler_with(MockForwarder::new(json!({}))));
    register(&handler, create_user()).await;

    let waiter = {
        let handler = handler.clone();
        tokio::spawn(async move {
            handler
                .handle(request(
                    Method::GET,
                    "/interactions/wait?interaction=create%20user&count=3",
                    None,
                ))
                .await
                .status()
        })
    };

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handler
            .handle(request(Method::POST, "/users", Some(json!({"name": "any"}))))
            .await;
    }
    assert_eq!(waiter.await.unwrap(), StatusCode::OK);
}

#[tokio::test]
async fn test_wait_times_out() {
    let handler = handler_with(MockForwarder::new(json!({})));
    register(&handler, create_user()).await;

    let response = handler
        .handle(request(
            Method::GET,
            "/interactions/wait?interaction=create%20user&count=3&timeout=100",
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_wait_for_all() {
    let handler = handler_with(MockForwarder::new(json!({})));
    register(&handler, create_user()).await;

    let response = handler
        .handle(request(Method::GET, "/interactions/wait?timeout=100", None))
        .await;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    handler
        .handle(request(Method::POST, "/users", Some(json!({"name": "any"}))))
        .await;
    let response = handler
        .handle(request(Method::GET, "/interactions/wait", None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_wait_unknown_interaction_and_bad_count() {
    let handler = handler_with(MockForwarder::new(json!({})));
    let response = handler
        .handle(request(Method::GET, "/interactions/wait?interaction=ghost", None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = handler
        .handle(request(Method::GET, "/interactions/wait?count=-1", None))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_all_counted() {
    let handler = Arc::new(handler_with(MockForwarder::new(json!({}))));
    register(&handler, create_user()).await;

    let mut tasks = Vec::new();
    for _ in 0..64 {
        let handler = handler.clone();
        tasks.push(tokio::spawn(async move {
            handler
                .handle(request(Method::POST, "/users", Some(json!({"name": "any"}))))
                .await
                .status()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }
    assert_eq!(
        handler.state().catalog().load("create user").unwrap().request_count(),
        64
    );
}
