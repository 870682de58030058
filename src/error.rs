//! Error types for llm-proxy
//!
//! [`AppError`] is the application taxonomy. [`ApiError`] pairs it with the
//! request's correlation id and turns it into the HTTP response clients see.

use crate::providers::ProviderError;
use crate::validation::ValidationError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Provider(err) => match err {
                ProviderError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
                ProviderError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                ProviderError::Forbidden(_) => StatusCode::FORBIDDEN,
                ProviderError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Attach the correlation id reported in the response body
    pub fn with_request_id(self, request_id: impl Into<String>) -> ApiError {
        ApiError {
            request_id: Some(request_id.into()),
            error: self,
        }
    }
}

/// An [`AppError`] on its way to the client
#[derive(Debug)]
pub struct ApiError {
    pub request_id: Option<String>,
    pub error: AppError,
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self {
            request_id: None,
            error,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        let request_id = self.request_id;
        let mut retry_after = None;

        let body = match &self.error {
            AppError::Validation(err) => json!({ "detail": err.to_string() }),
            AppError::RateLimited {
                retry_after_seconds,
            } => {
                retry_after = Some(*retry_after_seconds);
                json!({ "error": "Too Many Requests", "request_id": request_id })
            }
            AppError::Provider(ProviderError::ModelNotFound { message, .. }) => json!({
                "error": "Model Not Found",
                "detail": message,
                "request_id": request_id,
            }),
            AppError::Provider(ProviderError::Unauthorized(detail)) => json!({
                "error": "Unauthorized",
                "detail": detail,
                "request_id": request_id,
            }),
            AppError::Provider(ProviderError::Forbidden(detail)) => json!({
                "error": "Forbidden",
                "detail": detail,
                "request_id": request_id,
            }),
            AppError::Provider(ProviderError::RateLimited {
                retry_after_seconds,
                ..
            }) => {
                retry_after = *retry_after_seconds;
                json!({ "error": "Too Many Requests", "request_id": request_id })
            }
            internal => {
                tracing::error!(
                    request_id = request_id.as_deref().unwrap_or("-"),
                    error = %internal,
                    "Request failed with internal error"
                );
                json!({ "error": "Internal Server Error", "request_id": request_id })
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
