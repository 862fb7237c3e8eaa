//! Error types for the workagent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` is the umbrella.

use thiserror::Error;

use crate::registry::DiscoveryError;
use crate::schema::SchemaError;

/// The top-level error type for all workagent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Transcript protocol errors ---
    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    // --- Startup discovery ---
    #[error("Tool discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    // --- Parameter schemas ---
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

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

impl ProviderError {
    /// Whether a fresh attempt at the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::StreamInterrupted(_)
            | Self::Timeout(_)
            | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) | Self::NotConfigured(_) => {
                false
            }
        }
    }
}

/// Errors a tool reports from its own executor.
///
/// Tool implementers decide what goes into the user-facing variants.
/// `Internal` carries raw detail for logs only; it is never shown to the model.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool was cancelled")]
    Cancelled,

    #[error("Internal tool error: {0}")]
    Internal(String),
}

impl ToolError {
    /// The message that may be shown to the model.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "the tool failed with an internal error".into(),
            other => other.to_string(),
        }
    }
}

/// Violations of the transcript's tool-call correlation protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("tool result for '{call_id}' answers no pending tool call")]
    OrphanToolResult { call_id: String },

    #[error("tool call '{call_id}' already has a result")]
    DuplicateToolResult { call_id: String },

    #[error("tool call id '{call_id}' is used more than once")]
    DuplicateCallId { call_id: String },

    #[error("{pending} tool call(s) are still unanswered")]
    UnansweredToolCalls { pending: usize },
}
