//! In-process stub provider
//!
//! Default backend when nothing else is configured, and the fallback for
//! unknown provider names. Returns a fixed answer without any I/O.

use super::{FragmentStream, Provider, ProviderKind, ProviderResult};
use crate::schema::{
    ChatRequest, ChatResponse, Choice, Message, OBJECT_CHAT_COMPLETION, Usage, unix_timestamp,
};
use async_trait::async_trait;
use futures::stream;

pub const STUB_RESPONSE_ID: &str = "stub";
pub const STUB_CONTENT: &str = "stub response";
const STUB_FRAGMENTS: [&str; 2] = ["stub ", "response"];

#[derive(Debug, Clone, Copy, Default)]
pub struct StubProvider;

impl StubProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stub
    }

    async fn chat(
        &self,
        _request: &ChatRequest,
        _credential: Option<&str>,
    ) -> ProviderResult<ChatResponse> {
        Ok(ChatResponse {
            id: STUB_RESPONSE_ID.to_string(),
            object: OBJECT_CHAT_COMPLETION.to_string(),
            created: unix_timestamp(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(STUB_CONTENT),
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage::default(),
        })
    }

    async fn chat_stream(
        &self,
        _request: &ChatRequest,
        _credential: Option<&str>,
    ) -> ProviderResult<FragmentStream> {
        let fragments = STUB_FRAGMENTS.iter().map(|f| Ok(f.to_string()));
        Ok(Box::pin(stream::iter(fragments)))
    }
}
