//! API-key gate
//!
//! When enabled, every request must carry an `x-api-key` header matching one
//! of the configured keys.

use crate::handlers::AppState;
use crate::middleware::RequestId;
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn api_key_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let auth = &state.config().auth;
    if !auth.enabled {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);
    let key_present = presented.is_some();
    let accepted = presented
        .is_some_and(|key| !key.is_empty() && auth.api_keys.iter().any(|k| k.trim() == key));

    if accepted {
        return next.run(request).await;
    }

    let request_id = request.extensions().get::<RequestId>().cloned();
    tracing::warn!(
        request_id = request_id.as_ref().map(RequestId::as_str).unwrap_or("-"),
        path = %request.uri().path(),
        key_present,
        "Rejected request without a valid API key"
    );

    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Unauthorized",
            "request_id": request_id.as_ref().map(RequestId::as_str),
        })),
    )
        .into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("X-API-Key"),
    );
    response
}
