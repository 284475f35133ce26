//! Error taxonomy for the agent execution core.
//!
//! Every error that can reach the wire carries a stable `code` string that
//! clients switch on. HTTP transport errors live in [`crate::llm::http`] and
//! fold into [`CoreError::Http`]; their codes pass through unchanged.

use thiserror::Error;

use crate::llm::http::HttpError;

/// Errors surfaced by the core, each with a stable wire code.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("another task is already running")]
    Busy,

    #[error("invalid task input: {0}")]
    InvalidInput(String),

    #[error("task input exceeds the maximum length")]
    InputTooLong,

    #[error("planning failed: {0}")]
    PlanFailed(String),

    #[error("plan rejected by safety policy: {0}")]
    SafetyViolation(String),

    #[error("permission denied for tool '{tool}': {reason}")]
    PermissionDenied { tool: String, reason: String },

    #[error("tool '{0}' is not registered")]
    ToolNotFound(String),

    #[error("tool reported failure: {0}")]
    ToolFailed(String),

    #[error("tool raised an exception: {0}")]
    ToolException(String),

    #[error("LLM configuration is invalid: {0}")]
    LlmMisconfigured(String),

    #[error("LLM request was cancelled")]
    LlmCancelled,

    #[error("model '{0}' is not available")]
    LlmModelNotFound(String),

    #[error("LLM request failed: {0}")]
    LlmUnknown(String),

    #[error("invalid message payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Http(#[from] HttpError),
}

impl CoreError {
    /// The stable code string clients see on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Busy => "task.busy",
            CoreError::InvalidInput(_) => "task.invalid_input",
            CoreError::InputTooLong => "task.input_too_long",
            CoreError::PlanFailed(_) => "task.plan_failed",
            CoreError::SafetyViolation(_) => "task.safety_violation",
            CoreError::PermissionDenied { .. } => "permission.denied",
            CoreError::ToolNotFound(_) => "tool.not_found",
            CoreError::ToolFailed(_) => "tool.failed",
            CoreError::ToolException(_) => "tool.exception",
            CoreError::LlmMisconfigured(_) => "llm.misconfigured",
            CoreError::LlmCancelled => "llm.cancelled",
            CoreError::LlmModelNotFound(_) => "llm.model_not_found",
            CoreError::LlmUnknown(_) => "llm.unknown",
            CoreError::InvalidPayload(_) => "ipc.invalid_payload",
            CoreError::Http(e) => e.code(),
        }
    }

    /// Whether retrying the same operation may succeed. Only transport-level
    /// failures are ever retryable; cancellation never is.
    pub fn retryable(&self) -> bool {
        match self {
            CoreError::Http(e) => e.retryable,
            _ => false,
        }
    }
}
