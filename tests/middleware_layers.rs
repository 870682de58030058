//! Integration tests for the middleware stack
//!
//! Rate-limit admission, API-key auth, body limits, CORS, request ids and
//! the health and metrics endpoints, all through the assembled router.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use llm_proxy::{
    config::Config,
    handlers::{self, AppState},
};
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;

fn create_state(toml: &str) -> AppState {
    let config = Config::from_str(toml).expect("should parse TOML config");
    AppState::new(Arc::new(config)).expect("AppState::new should succeed")
}

fn create_app(toml: &str) -> Router {
    handlers::router(create_state(toml))
}

fn proxy_request(token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/proxy")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, token)
        .body(Body::from(
            json!({ "model": "m", "messages": [{ "role": "user", "content": "hi" }] })
                .to_string(),
        ))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const RATE_LIMITED: &str = r#"
[rate_limit]
enabled = true
window_seconds = 60
max_requests = 2
"#;

// -------------------------------------------------------------------------
// Rate limiting
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_rate_limit_denies_after_capacity() {
    let state = create_state(RATE_LIMITED);
    let app = handlers::router(state.clone());

    for _ in 0..2 {
        let response = app.clone().oneshot(proxy_request("Bearer a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.clone().oneshot(proxy_request("Bearer a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "60");

    let request_id = response.headers()["x-request-id"]
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(response).await;
    assert_eq!(body["error"], "Too Many Requests");
    assert_eq!(body["request_id"], request_id.as_str());
    assert_eq!(state.metrics().rate_limit_rejections_count(), 1);
}

#[tokio::test]
async fn test_rate_limit_buckets_are_per_credential() {
    let app = create_app(RATE_LIMITED);

    for _ in 0..2 {
        app.clone().oneshot(proxy_request("Bearer a")).await.unwrap();
    }
    let denied = app.clone().oneshot(proxy_request("Bearer a")).await.unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app.oneshot(proxy_request("Bearer b")).await.unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_runs_before_validation() {
    let app = create_app(RATE_LIMITED);
    let invalid = || {
        Request::builder()
            .method("POST")
            .uri("/proxy")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer v")
            .body(Body::from(r#"{"model":"m","messages":[]}"#))
            .unwrap()
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(invalid()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    let response = app.oneshot(invalid()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let app = create_app(RATE_LIMITED);
    for _ in 0..5 {
        let response = app.clone().oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// -------------------------------------------------------------------------
// API-key auth
// -------------------------------------------------------------------------

const AUTH: &str = r#"
[auth]
enabled = true
api_keys = ["secret-1", "secret-2"]
"#;

#[tokio::test]
async fn test_auth_rejects_missing_key() {
    let response = create_app(AUTH).oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "X-API-Key");
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_auth_rejects_wrong_key() {
    let mut request = proxy_request("Bearer a");
    request
        .headers_mut()
        .insert("x-api-key", "guess".parse().unwrap());

    let response = create_app(AUTH).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_accepts_configured_key() {
    let mut request = proxy_request("Bearer a");
    request
        .headers_mut()
        .insert("x-api-key", "secret-2".parse().unwrap());

    let response = create_app(AUTH).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// -------------------------------------------------------------------------
// Body limit, CORS, request ids
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_oversized_body_is_413() {
    let app = create_app(
        r#"
[server]
max_request_bytes = 64
"#,
    );
    let content = "x".repeat(500);
    let body = json!({ "model": "m", "messages": [{ "role": "user", "content": content }] });
    let request = Request::builder()
        .method("POST")
        .uri("/proxy")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer a")
        .header(header::CONTENT_LENGTH, body.to_string().len())
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin_by_default() {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/proxy")
        .header(header::ORIGIN, "https://somewhere.test")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = create_app("").oneshot(request).await.unwrap();
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_cors_restricts_to_configured_origins() {
    let app = create_app(
        r#"
[cors]
allow_origins = ["https://app.test"]
"#,
    );
    let request = |origin: &str| {
        Request::builder()
            .uri("/healthz")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    };

    let allowed = app.clone().oneshot(request("https://app.test")).await.unwrap();
    assert_eq!(
        allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.test"
    );

    let denied = app.oneshot(request("https://evil.test")).await.unwrap();
    assert!(
        denied
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[tokio::test]
async fn test_unknown_route_still_gets_request_id() {
    let response = create_app("").oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));
}

// -------------------------------------------------------------------------
// Health and metrics
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_healthz_reports_configuration() {
    let response = create_app(RATE_LIMITED).oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["uptime_seconds"].is_u64());
    assert!(body["version"].is_string());
    assert_eq!(
        body["rate_limit"],
        json!({ "enabled": true, "window_seconds": 60, "max_requests": 2 })
    );
    assert_eq!(body["logging"], json!({ "enabled": false, "level": "INFO" }));
    assert_eq!(body["cors"], json!({ "allow_origins": ["*"] }));
}

#[tokio::test]
async fn test_metrics_count_requests_by_route_template() {
    let app = create_app("");

    app.clone().oneshot(proxy_request("Bearer a")).await.unwrap();
    app.clone().oneshot(get("/nope")).await.unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; version=0.0.4"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#"http_requests_total{method="POST",path="/proxy",status="200"} 1"#));
    assert!(text.contains(r#"path="unmatched",status="404""#));
    assert!(text.contains(
        r#"provider_requests_total{operation="chat",outcome="success",provider="stub"} 1"#
    ));
}
