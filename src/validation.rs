//! Request validation and normalization
//!
//! Every chat request passes through [`validate_and_normalize`] before it is
//! handed to a provider. Validation rewrites message roles and contents to
//! their trimmed, lower-cased (role only) form, so providers never see raw
//! client formatting and never re-validate.

use crate::schema::{ChatRequest, Role};
use thiserror::Error;

/// Client-caused request errors (always HTTP 400)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Model must not be empty")]
    EmptyModel,

    #[error("Messages must not be empty")]
    EmptyMessages,

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Message content must not be empty")]
    EmptyContent,

    #[error("Last message must be from role \"user\" or \"system\"")]
    TrailingAssistant,

    #[error("Parameter out of range: {name} must be {expected}")]
    OutOfRangeParam {
        name: &'static str,
        expected: &'static str,
    },
}

impl ValidationError {
    /// Name of the offending sampling parameter, if this is a range error
    pub fn param(&self) -> Option<&'static str> {
        match self {
            Self::OutOfRangeParam { name, .. } => Some(*name),
            _ => None,
        }
    }
}

/// Validate a request and normalize its messages in place
///
/// Checks run in this order: model, message list, each message (role then
/// content), trailing role, sampling parameters. The first failure wins.
///
/// On success every message role is one of `system`, `user`, `assistant`
/// and every content string is trimmed. On failure the request may be
/// partially normalized and should be discarded.
///
/// # Examples
///
/// ```
/// use llm_proxy::schema::{ChatRequest, Message};
/// use llm_proxy::validation::validate_and_normalize;
///
/// let mut request = ChatRequest::new(
///     "m",
///     vec![Message { role: " User ".into(), content: "  hello ".into() }],
/// );
/// validate_and_normalize(&mut request).unwrap();
/// assert_eq!(request.messages[0].role, "user");
/// assert_eq!(request.messages[0].content, "hello");
/// ```
pub fn validate_and_normalize(request: &mut ChatRequest) -> Result<(), ValidationError> {
    if request.model.trim().is_empty() {
        return Err(ValidationError::EmptyModel);
    }

    if request.messages.is_empty() {
        return Err(ValidationError::EmptyMessages);
    }

    for message in &mut request.messages {
        let role = message.role.trim().to_lowercase();
        if role.parse::<Role>().is_err() {
            return Err(ValidationError::InvalidRole(message.role.clone()));
        }

        let content = message.content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }

        let content = content.to_string();
        message.role = role;
        message.content = content;
    }

    if let Some(last) = request.messages.last()
        && last.parsed_role() == Some(Role::Assistant)
    {
        return Err(ValidationError::TrailingAssistant);
    }

    validate_sampling(request)
}

fn validate_sampling(request: &ChatRequest) -> Result<(), ValidationError> {
    check_range("temperature", request.temperature, 0.0, 2.0, "between 0 and 2")?;
    check_range("top_p", request.top_p, 0.0, 1.0, "between 0 and 1")?;
    check_range(
        "frequency_penalty",
        request.frequency_penalty,
        -2.0,
        2.0,
        "between -2 and 2",
    )?;
    check_range(
        "presence_penalty",
        request.presence_penalty,
        -2.0,
        2.0,
        "between -2 and 2",
    )?;

    if let Some(max_tokens) = request.max_tokens
        && max_tokens <= 0
    {
        return Err(ValidationError::OutOfRangeParam {
            name: "max_tokens",
            expected: "greater than 0",
        });
    }

    if let Some(n) = request.n
        && n <= 0
    {
        return Err(ValidationError::OutOfRangeParam {
            name: "n",
            expected: "greater than 0",
        });
    }

    Ok(())
}

/// Inclusive range check; NaN and infinities are always out of range.
fn check_range(
    name: &'static str,
    value: Option<f64>,
    min: f64,
    max: f64,
    expected: &'static str,
) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() || !(min..=max).contains(&v) => {
            Err(ValidationError::OutOfRangeParam { name, expected })
        }
        _ => Ok(()),
    }
}
