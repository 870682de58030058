//! OpenAI-compatible chat backend
//!
//! Talks to any server exposing `POST {base_url}/chat/completions` in the
//! OpenAI shape: Ollama, vLLM, LocalAI, LM Studio, llama.cpp and friends.
//! The default base URL is a local Ollama instance, never a paid public API.
//!
//! Non-2xx statuses are classified before any body is consumed as a
//! completion or stream. 401, 403 and 429 become typed errors; 404 becomes
//! [`ProviderError::ModelNotFound`] only when the body says so about the
//! requested model. Everything else is an opaque [`ProviderError::Upstream`].

use super::sse::{self, SseLine};
use super::{FragmentStream, Provider, ProviderError, ProviderKind, ProviderResult};
use crate::schema::{
    ChatRequest, ChatResponse, Choice, Message, OBJECT_CHAT_COMPLETION, Stop, Usage,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default backend: a local Ollama server
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

/// Default non-streaming request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Longest SSE line buffered while waiting for its newline
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Upstream error bodies are cut to this many characters in logs and errors
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Id reported when a backend response carries none
const FALLBACK_RESPONSE_ID: &str = "ollama";

/// Connection settings for one adapter instance
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiCompatConfig {
    /// Base URL up to and including the API version, e.g. `http://host:11434/v1`
    pub base_url: String,
    /// Static credential sent as a bearer token when the caller supplies none
    pub api_key: Option<String>,
    /// Applies to non-streaming calls only
    pub timeout: Duration,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Adapter for OpenAI-compatible backends
///
/// Holds one pooled `reqwest::Client`; the registry reuses an instance per
/// provider name so connections are shared across requests.
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    completions_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Construction(format!("HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/');
        let api_key = config.api_key.filter(|key| !key.trim().is_empty());

        tracing::debug!(
            base_url = %base_url,
            static_credential = api_key.is_some(),
            timeout_seconds = config.timeout.as_secs_f64(),
            "Created OpenAI-compatible provider"
        );

        Ok(Self {
            client,
            completions_url: format!("{}/chat/completions", base_url),
            api_key,
            timeout: config.timeout,
        })
    }

    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    /// Outbound `Authorization` value
    ///
    /// A non-blank caller credential is forwarded verbatim; otherwise the
    /// static key is sent as a bearer token; otherwise nothing is sent.
    fn authorization(&self, credential: Option<&str>) -> Option<String> {
        match credential {
            Some(credential) if !credential.trim().is_empty() => Some(credential.to_string()),
            _ => self.api_key.as_ref().map(|key| format!("Bearer {}", key)),
        }
    }

    fn post(
        &self,
        request: &ChatRequest,
        credential: Option<&str>,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(&self.completions_url)
            .json(&CompletionPayload::new(request, stream));
        if let Some(value) = self.authorization(credential) {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder
    }

    fn timeout_error(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout {
                timeout_seconds: self.timeout.as_secs_f64(),
            }
        } else {
            ProviderError::Transport(error)
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiCompatible
    }

    async fn chat(
        &self,
        request: &ChatRequest,
        credential: Option<&str>,
    ) -> ProviderResult<ChatResponse> {
        let response = self
            .post(request, credential, false)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.timeout_error(e))?;

        let response = ensure_success(response, &request.model).await?;
        let body = response.bytes().await.map_err(|e| self.timeout_error(e))?;

        let wire: WireResponse = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(wire.into_chat_response())
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        credential: Option<&str>,
    ) -> ProviderResult<FragmentStream> {
        // No timeout: generation length is open-ended. The caller bounds
        // the stream by dropping it.
        let response = self.post(request, credential, true).send().await?;
        let response = ensure_success(response, &request.model).await?;

        Ok(fragments(response.bytes_stream()))
    }
}

/// Turn a streamed response body into text fragments
///
/// Lines may span chunk boundaries, so bytes are buffered until a newline.
/// A line growing past [`MAX_LINE_BYTES`] is dropped as malformed up to its
/// newline. A transport error is yielded once and ends the stream; `[DONE]`
/// ends it cleanly. Dropping the returned stream drops the body and releases
/// the connection.
pub fn fragments<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ProviderError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;
        let mut discarding = false;

        while !finished {
            let chunk = match body.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(error)) => {
                    yield Err::<String, ProviderError>(error.into());
                    return;
                }
                None => break,
            };
            let mut bytes = chunk.as_ref();
            if discarding {
                match bytes.iter().position(|b| *b == b'\n') {
                    Some(newline) => {
                        bytes = &bytes[newline + 1..];
                        discarding = false;
                    }
                    None => continue,
                }
            }
            buffer.extend_from_slice(bytes);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                match sse::parse_line(&String::from_utf8_lossy(&line)) {
                    SseLine::Fragment(text) => {
                        yield Ok(text);
                    }
                    SseLine::Done => {
                        finished = true;
                        break;
                    }
                    SseLine::Skip => {}
                }
            }

            if !finished && buffer.len() > MAX_LINE_BYTES {
                tracing::warn!(
                    buffered = buffer.len(),
                    limit = MAX_LINE_BYTES,
                    "Dropping oversized stream line"
                );
                buffer.clear();
                discarding = true;
            }
        }

        // Backends may omit the trailing newline on the last frame
        if !finished
            && !discarding
            && !buffer.is_empty()
            && let SseLine::Fragment(text) = sse::parse_line(&String::from_utf8_lossy(&buffer))
        {
            yield Ok(text);
        }
    })
}

/// Pass 2xx responses through; classify everything else
async fn ensure_success(
    response: reqwest::Response,
    model: &str,
) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await.unwrap_or_default();

    let error = classify_failure(status, retry_after.as_deref(), &body, model);
    tracing::warn!(
        status = status.as_u16(),
        model = %model,
        error = %error,
        "Backend returned an error status"
    );
    Err(error)
}

/// Map a non-2xx backend response onto the error taxonomy
pub fn classify_failure(
    status: StatusCode,
    retry_after: Option<&str>,
    body: &str,
    model: &str,
) -> ProviderError {
    let message = error_message(body);

    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Unauthorized(or_default(message, "Unauthorized")),
        StatusCode::FORBIDDEN => ProviderError::Forbidden(or_default(message, "Forbidden")),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            message: or_default(message, "Rate Limited"),
            retry_after_seconds: retry_after.and_then(|v| v.trim().parse().ok()),
        },
        StatusCode::NOT_FOUND if mentions_missing_model(&message, model) => {
            ProviderError::ModelNotFound {
                model: model.to_string(),
                message,
            }
        }
        _ => ProviderError::Upstream {
            status: status.as_u16(),
            body: truncate(body, MAX_ERROR_BODY_CHARS),
        },
    }
}

/// Best-effort check that a 404 message is about the requested model
///
/// The message must contain one of the model-ish keywords and the model
/// name with spaces removed. Only the message is lower-cased, so a model
/// name with capitals never matches.
fn mentions_missing_model(message: &str, model: &str) -> bool {
    let lower = message.to_lowercase();
    let keyword = ["model", "not found", "unknown model"]
        .iter()
        .any(|key| lower.contains(key));
    keyword && lower.contains(&model.replace(' ', ""))
}

/// Pull a human-readable message out of an error body
///
/// Understands `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"message": "..."}`. Anything else yields an empty string.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return String::new();
    };

    let from_error = match value.get("error") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(serde_json::Value::Object(obj)) if !obj.is_empty() => Some(
            obj.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_owned)
                .unwrap_or_else(|| serde_json::Value::Object(obj.clone()).to_string()),
        ),
        _ => None,
    };

    from_error
        .or_else(|| {
            value
                .get("message")
                .and_then(|m| m.as_str())
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_default()
}

fn or_default(message: String, default: &str) -> String {
    if message.is_empty() {
        default.to_string()
    } else {
        message
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Outbound request body
#[derive(Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a Stop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<i64>,
    stream: bool,
}

impl<'a> CompletionPayload<'a> {
    fn new(request: &'a ChatRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
            stop: request.stop.as_ref(),
            n: request.n,
            stream,
        }
    }
}

// Lenient mirrors of the backend response: every field may be missing or null.

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    object: Option<String>,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    choices: Option<Vec<WireChoice>>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

impl WireResponse {
    fn into_chat_response(self) -> ChatResponse {
        let mut choices: Vec<Choice> = self
            .choices
            .unwrap_or_default()
            .into_iter()
            .map(WireChoice::into_choice)
            .collect();

        if choices.is_empty() {
            choices.push(Choice {
                index: 0,
                message: Message::assistant(""),
                finish_reason: Some("stop".to_string()),
            });
        }

        let usage = self
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
                total_tokens: u.total_tokens.unwrap_or(0),
            })
            .unwrap_or_default();

        ChatResponse {
            id: self.id.unwrap_or_else(|| FALLBACK_RESPONSE_ID.to_string()),
            object: self
                .object
                .unwrap_or_else(|| OBJECT_CHAT_COMPLETION.to_string()),
            created: self.created.unwrap_or(0),
            choices,
            usage,
        }
    }
}

impl WireChoice {
    fn into_choice(self) -> Choice {
        let (role, content) = match self.message {
            Some(m) => (m.role, m.content),
            None => (None, None),
        };
        Choice {
            index: self.index.unwrap_or(0),
            message: Message {
                role: role.unwrap_or_else(|| "assistant".to_string()),
                content: content.unwrap_or_default(),
            },
            finish_reason: self.finish_reason,
        }
    }
}
