//! llm-proxy - HTTP gateway for chat-completion backends
//!
//! Accepts chat requests, validates them, resolves the requested model to a
//! provider, and returns either one response or a server-sent event stream.
//! Backends speak the OpenAI chat-completions protocol; a built-in stub
//! answers locally.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod providers;
pub mod rate_limit;
pub mod schema;
pub mod telemetry;
pub mod validation;
