//! Health check endpoint
//!
//! Reports liveness plus the effective runtime settings operators usually
//! want to confirm after a deploy.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Version reported when `APP_VERSION` is unset
pub const DEFAULT_VERSION: &str = "1.0";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub version: String,
    pub rate_limit: RateLimitStatus,
    pub logging: LoggingStatus,
    pub cors: CorsStatus,
}

#[derive(Debug, Serialize)]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub window_seconds: u64,
    pub max_requests: usize,
}

#[derive(Debug, Serialize)]
pub struct LoggingStatus {
    pub enabled: bool,
    pub level: String,
}

#[derive(Debug, Serialize)]
pub struct CorsStatus {
    pub allow_origins: Vec<String>,
}

/// Health check handler
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let config = state.config();
    let version = std::env::var("APP_VERSION")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            uptime_seconds: state.uptime().as_secs(),
            version,
            rate_limit: RateLimitStatus {
                enabled: config.rate_limit.enabled,
                window_seconds: config.rate_limit.window_seconds,
                max_requests: config.rate_limit.max_requests,
            },
            logging: LoggingStatus {
                enabled: config.observability.log_requests,
                level: config.observability.log_level.to_uppercase(),
            },
            cors: CorsStatus {
                allow_origins: config.cors.allow_origins.clone(),
            },
        }),
    )
}
