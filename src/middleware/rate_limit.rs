//! Rate-limit admission for the proxy routes
//!
//! Runs ahead of body extraction, so a denied request is never parsed or
//! validated.

use crate::error::{ApiError, AppError};
use crate::handlers::AppState;
use crate::middleware::RequestId;
use crate::rate_limit::Admission;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::time::Instant;

/// Bucket key for callers with neither credential nor peer address
pub const ANONYMOUS_KEY: &str = "anonymous";

/// Caller identity: Authorization header, else peer IP, else anonymous
pub fn client_key(request: &Request) -> String {
    if let Some(credential) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
    {
        return credential.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS_KEY.to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.limiter() else {
        return next.run(request).await;
    };

    let key = client_key(&request);
    match limiter.admit(&key, Instant::now()) {
        Admission::Allowed => next.run(request).await,
        Admission::Denied { retry_after } => {
            state.metrics().rate_limit_rejection();

            let request_id = request.extensions().get::<RequestId>().cloned();
            tracing::warn!(
                request_id = request_id.as_ref().map(RequestId::as_str).unwrap_or("-"),
                path = %request.uri().path(),
                retry_after_seconds = retry_after.as_secs(),
                "Rate limit exceeded"
            );

            ApiError {
                request_id: request_id.map(|id| id.as_str().to_string()),
                error: AppError::RateLimited {
                    retry_after_seconds: retry_after.as_secs(),
                },
            }
            .into_response()
        }
    }
}
