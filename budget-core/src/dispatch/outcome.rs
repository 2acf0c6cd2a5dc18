use super::wire::{ApiError, Usage};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};

pub const QUOTA_MESSAGE: &str =
    "I'm sorry, but I've reached my usage limit. Please try again later or contact support.";
pub const TOO_LONG_MESSAGE: &str =
    "The conversation has become too long. Please start a new chat to continue.";
pub const HISTORY_TOO_LONG_MESSAGE: &str =
    "The conversation history is too long. Please start a new chat.";
pub const EMPTY_SELECTION_MESSAGE: &str =
    "I'm sorry, but the conversation history is too long. Please start a new chat.";
pub const INVALID_REQUEST_MESSAGE: &str =
    "I'm sorry, there was an issue with your request. Please try again.";
pub const RATE_LIMIT_MESSAGE: &str =
    "I'm receiving too many requests right now. Please wait a moment and try again.";
pub const TRY_LATER_MESSAGE: &str =
    "I'm sorry, I'm having trouble processing your request right now. Please try again later.";

const CONTEXT_LENGTH_MARKER: &str = "maximum context length";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        let total_tokens = match usage.total_tokens {
            0 => usage.prompt_tokens + usage.completion_tokens,
            total => total,
        };
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens,
        }
    }
}

/// Why a dispatch did not produce a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    QuotaExhausted,
    InvalidRequestLength,
    InvalidRequest,
    RateLimited,
    ContextLengthExceeded,
    UnknownApiError,
    TransportFailure,
    TransportContextLength,
    EmptySelection,
}

impl FailureKind {
    pub fn from_api_error(error: &ApiError) -> Self {
        match error.error_type() {
            "insufficient_quota" => FailureKind::QuotaExhausted,
            "invalid_request_error" if error.message.contains(CONTEXT_LENGTH_MARKER) => {
                FailureKind::InvalidRequestLength
            }
            "invalid_request_error" => FailureKind::InvalidRequest,
            "rate_limit_exceeded" => FailureKind::RateLimited,
            "context_length_exceeded" => FailureKind::ContextLengthExceeded,
            _ => FailureKind::UnknownApiError,
        }
    }

    pub fn from_transport_error(error: &EngineError) -> Self {
        if error.mentions_context_length() {
            FailureKind::TransportContextLength
        } else {
            FailureKind::TransportFailure
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::QuotaExhausted => QUOTA_MESSAGE,
            FailureKind::InvalidRequestLength | FailureKind::TransportContextLength => {
                TOO_LONG_MESSAGE
            }
            FailureKind::InvalidRequest => INVALID_REQUEST_MESSAGE,
            FailureKind::RateLimited => RATE_LIMIT_MESSAGE,
            FailureKind::ContextLengthExceeded => HISTORY_TOO_LONG_MESSAGE,
            FailureKind::UnknownApiError | FailureKind::TransportFailure => TRY_LATER_MESSAGE,
            FailureKind::EmptySelection => EMPTY_SELECTION_MESSAGE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::QuotaExhausted => "quota_exhausted",
            FailureKind::InvalidRequestLength => "invalid_request_length",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ContextLengthExceeded => "context_length_exceeded",
            FailureKind::UnknownApiError => "unknown_api_error",
            FailureKind::TransportFailure => "transport_failure",
            FailureKind::TransportContextLength => "transport_context_length",
            FailureKind::EmptySelection => "empty_selection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStatus {
    /// Provider returned content and usage.
    Succeeded,
    /// Provider returned content without usage; usage was estimated locally.
    DegradedNoUsage,
    /// Never sent, or the API answered with a structured error.
    Rejected(FailureKind),
    /// Transport, timeout or decoding fault.
    Failed(FailureKind),
}

impl DispatchStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchStatus::Succeeded => "succeeded",
            DispatchStatus::DegradedNoUsage => "degraded_no_usage",
            DispatchStatus::Rejected(_) => "rejected",
            DispatchStatus::Failed(_) => "failed",
        }
    }
}

/// Renderable result of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub status: DispatchStatus,
    pub content: String,
    pub usage: Option<TokenUsage>,
}

impl CompletionOutcome {
    pub fn succeeded(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            status: DispatchStatus::Succeeded,
            content: content.into(),
            usage: Some(usage),
        }
    }

    pub fn degraded(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            status: DispatchStatus::DegradedNoUsage,
            content: content.into(),
            usage: Some(usage),
        }
    }

    pub fn rejected(kind: FailureKind) -> Self {
        Self {
            status: DispatchStatus::Rejected(kind),
            content: kind.user_message().to_string(),
            usage: None,
        }
    }

    pub fn failed(kind: FailureKind) -> Self {
        Self {
            status: DispatchStatus::Failed(kind),
            content: kind.user_message().to_string(),
            usage: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            DispatchStatus::Succeeded | DispatchStatus::DegradedNoUsage
        )
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.status {
            DispatchStatus::Rejected(kind) | DispatchStatus::Failed(kind) => Some(kind),
            _ => None,
        }
    }
}
