//! Provider capability: the contract every chat backend implements
//!
//! A provider answers a validated [`ChatRequest`] either in one piece
//! ([`Provider::chat`]) or as a stream of text fragments
//! ([`Provider::chat_stream`]). Backends are selected by name through
//! [`ProviderKind`]; see [`registry`] for model-to-provider resolution.

use crate::schema::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use thiserror::Error;

pub mod openai_compat;
pub mod registry;
pub mod sse;
pub mod stub;

pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use registry::{ModelProviderMap, ProviderRegistry, ProviderSelector, ResolvedProvider};
pub use stub::StubProvider;

/// Errors raised by any provider
///
/// The first four variants are typed backend decisions that the gateway
/// maps 1:1 onto HTTP statuses. Everything else is opaque: logged in full
/// server-side, surfaced to clients only as a generic 500.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Model not found: {model}: {message}")]
    ModelNotFound { model: String, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited by backend: {message}")]
    RateLimited {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Backend request timed out after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: f64 },

    #[error("Backend returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Backend transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    #[error("Failed to construct provider: {0}")]
    Construction(String),
}

impl ProviderError {
    /// True for failures that must not leak detail to the caller
    pub fn is_opaque(&self) -> bool {
        !matches!(
            self,
            Self::ModelNotFound { .. }
                | Self::Unauthorized(_)
                | Self::Forbidden(_)
                | Self::RateLimited { .. }
        )
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Lazily produced text fragments of one streamed completion
///
/// Finite and not rewindable. An `Err` item ends the stream; nothing
/// follows it.
pub type FragmentStream = Pin<Box<dyn Stream<Item = ProviderResult<String>> + Send>>;

/// Backend variants selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Stub,
    OpenAiCompatible,
}

/// Names that select the OpenAI-compatible adapter
pub const OPENAI_COMPAT_ALIASES: &[&str] = &[
    "ollama",
    "openai",
    "openai_compat",
    "openai-compatible",
    "compat",
    "vllm",
    "localai",
    "lmstudio",
    "llamacpp",
    "llama.cpp",
];

impl ProviderKind {
    /// Classify an already-normalized provider name
    ///
    /// Unknown names select [`ProviderKind::Stub`]: a typo in the routing
    /// table degrades to the stub instead of failing requests.
    pub fn from_name(name: &str) -> Self {
        if OPENAI_COMPAT_ALIASES.contains(&name) {
            ProviderKind::OpenAiCompatible
        } else {
            ProviderKind::Stub
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Stub => "stub",
            ProviderKind::OpenAiCompatible => "openai_compat",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat backend
///
/// `credential` is the caller's raw `Authorization` header value, if any.
/// Requests arrive already validated and normalized.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Complete the request in one call
    async fn chat(
        &self,
        request: &ChatRequest,
        credential: Option<&str>,
    ) -> ProviderResult<ChatResponse>;

    /// Open a fragment stream
    ///
    /// Errors known before the first fragment (bad status, connect failure)
    /// are returned here; later failures arrive as an `Err` stream item.
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        credential: Option<&str>,
    ) -> ProviderResult<FragmentStream>;
}
