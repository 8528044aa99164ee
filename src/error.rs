//! Error types shared across draft-forge subsystems.
//!
//! Subsystem-specific errors live next to their code (`DatabaseError` in
//! `storage`, `ConfigError` in `config`, `PipelineError` in `pipeline`,
//! `SupervisorError` in `scheduler`). This module holds the errors raised by
//! the language-model layer, which every other subsystem consumes.

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Research stream failed: {0}")]
    Stream(String),
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RequestFailed(_)
            | LlmError::RateLimited(_)
            | LlmError::Timeout(_)
            | LlmError::Stream(_)
            | LlmError::EmptyResponse => true,
            LlmError::ApiError { code, .. } => *code >= 500 || *code == 429,
            LlmError::MissingApiBase | LlmError::ParseError(_) => false,
        }
    }
}
