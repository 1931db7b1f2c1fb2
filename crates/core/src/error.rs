//! Error types for the Chatweave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all Chatweave operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Completion decoding ---
    /// The backend answered, but the answer cannot be acted upon
    /// (no choices, or neither tool calls nor content).
    #[error("Invalid completion: {reason}")]
    InvalidCompletion {
        reason: String,
        /// Debug rendering of the offending response or chunk.
        raw: String,
    },

    /// The stream closed before any chunk told us what to do.
    #[error("Invalid completion stream: {0}")]
    InvalidCompletionStream(String),

    #[error("Recursion limit reached after {limit} tool turns")]
    RecursionLimit { limit: u32 },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an [`Error::InvalidCompletion`] carrying a debug dump of `raw`.
    pub fn invalid_completion(reason: impl Into<String>, raw: &impl std::fmt::Debug) -> Self {
        Self::InvalidCompletion {
            reason: reason.into(),
            raw: format!("{raw:?}"),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool panicked: {tool_name}")]
    Panicked { tool_name: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn invalid_completion_keeps_raw_payload() {
        let err = Error::invalid_completion("missing messages", &vec!["choice"]);
        match &err {
            Error::InvalidCompletion { reason, raw } => {
                assert_eq!(reason, "missing messages");
                assert!(raw.contains("choice"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("missing messages"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::ExecutionFailed {
            tool_name: "search".into(),
            reason: "index offline".into(),
        });
        assert!(err.to_string().contains("search"));
        assert!(err.to_string().contains("index offline"));
    }
}
