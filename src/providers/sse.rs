//! Line-level parsing of OpenAI-style streaming responses
//!
//! Backends stream `data: {json}` frames separated by blank lines and end
//! with `data: [DONE]`. Only `choices[0].delta.content` is of interest; any
//! other delta field (role changes, tool calls) is ignored, and frames that
//! do not parse are skipped so one bad frame cannot kill a healthy stream.

use serde::Deserialize;

/// Terminal sentinel sent by OpenAI-compatible backends
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a single stream line means to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Heartbeat, comment, malformed or content-free frame
    Skip,
    /// End of stream
    Done,
    /// Non-empty text to forward
    Fragment(String),
}

#[derive(Deserialize)]
struct ChunkFrame {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Classify one line of a streaming response body
///
/// The `data:` prefix is optional, so bare JSON lines are accepted too.
///
/// # Examples
///
/// ```
/// use llm_proxy::providers::sse::{SseLine, parse_line};
///
/// assert_eq!(
///     parse_line(r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#),
///     SseLine::Fragment("hi".to_string())
/// );
/// assert_eq!(parse_line("data: [DONE]"), SseLine::Done);
/// assert_eq!(parse_line(""), SseLine::Skip);
/// ```
pub fn parse_line(line: &str) -> SseLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }

    let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if payload == DONE_SENTINEL {
        return SseLine::Done;
    }

    let Ok(frame) = serde_json::from_str::<ChunkFrame>(payload) else {
        tracing::trace!(len = payload.len(), "Skipping unparseable stream frame");
        return SseLine::Skip;
    };

    match frame
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
    {
        Some(content) if !content.is_empty() => SseLine::Fragment(content),
        _ => SseLine::Skip,
    }
}
