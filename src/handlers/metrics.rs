//! Prometheus metrics endpoint
//!
//! Exposes metrics in Prometheus text format for scraping.

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::handlers::AppState;
use crate::metrics::TEXT_CONTENT_TYPE;

/// Metrics handler for Prometheus scraping
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if metrics collection fails
///
/// # Example
///
/// ```bash
/// curl http://localhost:8000/metrics
/// # HELP provider_requests_total Total provider calls by provider, operation and outcome
/// # TYPE provider_requests_total counter
/// provider_requests_total{operation="chat",outcome="success",provider="stub"} 42
/// ```
pub async fn handler(State(state): State<AppState>) -> Response {
    match state.metrics().gather() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
            output,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather metrics for Prometheus scraping");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to gather metrics: {}", e),
            )
                .into_response()
        }
    }
}
