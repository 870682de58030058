//! Provider call outcome reporting
//!
//! The gateway reports every provider invocation through [`OutcomeRecorder`]
//! and never touches a metrics backend itself.

use std::fmt;
use std::time::Duration;

/// Which provider operation was invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Chat,
    ChatStream,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Chat => "chat",
            Operation::ChatStream => "chat_stream",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Error,
    /// Call or stream dropped by the consumer before it finished
    Cancelled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
            Outcome::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finished provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// Normalized provider name the model resolved to
    pub provider: String,
    pub operation: Operation,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// Sink for call outcomes
///
/// Called exactly once per provider invocation, from the request task, so
/// implementations must be cheap and must not block.
pub trait OutcomeRecorder: Send + Sync {
    fn record(&self, outcome: &CallOutcome);
}

/// Recorder that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl OutcomeRecorder for NoopRecorder {
    fn record(&self, _outcome: &CallOutcome) {}
}
