//! Request orchestration: validate, resolve, invoke, report
//!
//! [`Gateway`] owns the provider selection strategy and the outcome sink.
//! HTTP concerns (admission, framing, status codes) stay in the handlers.

use crate::error::AppResult;
use crate::providers::{FragmentStream, ProviderSelector, ResolvedProvider};
use crate::schema::{ChatRequest, ChatResponse};
use crate::validation::validate_and_normalize;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

pub mod outcome;

pub use outcome::{CallOutcome, NoopRecorder, Operation, Outcome, OutcomeRecorder};

/// Orchestrates one chat call end to end
#[derive(Clone)]
pub struct Gateway {
    selector: Arc<dyn ProviderSelector>,
    recorder: Arc<dyn OutcomeRecorder>,
}

impl Gateway {
    pub fn new(
        selector: Arc<dyn ProviderSelector>,
        recorder: Arc<dyn OutcomeRecorder>,
    ) -> Self {
        Self { selector, recorder }
    }

    /// Validate and resolve; nothing reaches a provider on failure
    fn prepare(&self, request: &mut ChatRequest) -> AppResult<ResolvedProvider> {
        validate_and_normalize(request)?;
        let resolved = self.selector.select(&request.model).map_err(|e| {
            tracing::error!(model = %request.model, error = %e, "Provider resolution failed");
            e
        })?;
        Ok(resolved)
    }

    /// Single-response chat
    pub async fn chat(
        &self,
        mut request: ChatRequest,
        credential: Option<&str>,
    ) -> AppResult<ChatResponse> {
        let resolved = self.prepare(&mut request)?;
        let mut guard = OutcomeGuard::new(&self.recorder, &resolved.name, Operation::Chat);

        let result = resolved.provider.chat(&request, credential).await;

        guard.report(if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Error
        });

        match &result {
            Ok(response) => tracing::debug!(
                provider = %resolved.name,
                model = %request.model,
                choices = response.choices.len(),
                "Chat completed"
            ),
            Err(e) => tracing::warn!(
                provider = %resolved.name,
                model = %request.model,
                error = %e,
                "Chat failed"
            ),
        }

        result.map_err(Into::into)
    }

    /// Open a fragment stream
    ///
    /// Errors before the first fragment are returned directly. The returned
    /// stream reports its outcome exactly once: success when it ends, error
    /// when the provider yields one, cancelled when dropped early.
    pub async fn open_stream(
        &self,
        mut request: ChatRequest,
        credential: Option<&str>,
    ) -> AppResult<FragmentStream> {
        let resolved = self.prepare(&mut request)?;
        let mut guard =
            OutcomeGuard::new(&self.recorder, &resolved.name, Operation::ChatStream);

        let inner = match resolved.provider.chat_stream(&request, credential).await {
            Ok(inner) => inner,
            Err(e) => {
                tracing::warn!(
                    provider = %resolved.name,
                    model = %request.model,
                    error = %e,
                    "Failed to open stream"
                );
                guard.report(Outcome::Error);
                return Err(e.into());
            }
        };

        Ok(Box::pin(async_stream::stream! {
            let mut guard = guard;
            let mut inner = inner;
            while let Some(item) = inner.next().await {
                match item {
                    Ok(fragment) => {
                        yield Ok(fragment);
                    }
                    Err(e) => {
                        guard.report(Outcome::Error);
                        yield Err(e);
                        return;
                    }
                }
            }
            guard.report(Outcome::Success);
        }))
    }
}

/// Reports one provider call exactly once; `Cancelled` if dropped unreported
///
/// Created before the provider is awaited so a caller dropping the future
/// mid-call is still accounted for.
struct OutcomeGuard {
    recorder: Arc<dyn OutcomeRecorder>,
    provider: String,
    operation: Operation,
    started: Instant,
    reported: bool,
}

impl OutcomeGuard {
    fn new(recorder: &Arc<dyn OutcomeRecorder>, provider: &str, operation: Operation) -> Self {
        Self {
            recorder: Arc::clone(recorder),
            provider: provider.to_string(),
            operation,
            started: Instant::now(),
            reported: false,
        }
    }

    fn report(&mut self, outcome: Outcome) {
        if self.reported {
            return;
        }
        self.reported = true;
        self.recorder.record(&CallOutcome {
            provider: self.provider.clone(),
            operation: self.operation,
            outcome,
            elapsed: self.started.elapsed(),
        });
    }
}

impl Drop for OutcomeGuard {
    fn drop(&mut self) {
        if !self.reported {
            tracing::debug!(
                provider = %self.provider,
                operation = %self.operation,
                "Provider call dropped before completion"
            );
            self.report(Outcome::Cancelled);
        }
    }
}
