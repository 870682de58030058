//! Axum middleware layers

pub mod auth;
pub mod http_metrics;
pub mod rate_limit;
pub mod request_id;

pub use auth::{API_KEY_HEADER, api_key_middleware};
pub use http_metrics::http_metrics_middleware;
pub use rate_limit::{client_key, rate_limit_middleware};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
