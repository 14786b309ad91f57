//! Error taxonomy shared by the store, the providers, and the tool dispatcher.
//!
//! Every failure that can reach a tool caller is a [`MemoryError`]. The
//! dispatcher turns it into a structured `{"error": {"kind", "message"}}`
//! payload using [`MemoryError::kind`].

use serde::Serialize;
use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors surfaced by the memory façade.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Malformed, ambiguous, or unsafe arguments. Raised before any store call.
    #[error("{0}")]
    Validation(String),

    /// The referenced memory id does not resolve to a live record.
    #[error("memory not found: {0}")]
    NotFound(String),

    /// The store is unreachable or held by another process.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The extraction or embedding provider failed or timed out.
    #[error("{provider} provider error: {message}")]
    UpstreamProvider { provider: String, message: String },

    /// Invalid configuration detected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unexpected store or serialization failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Stable tag reported to tool callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::UpstreamProvider { .. } => "upstream_provider_error",
            Self::Config(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Structured form sent back across the tool boundary.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
            },
        }
    }
}

/// `{"error": {...}}` envelope.
#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase,
            ) => Self::StoreUnavailable(err.to_string()),
            _ => Self::Internal(format!("database error: {err}")),
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {err}"))
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task failed: {err}"))
    }
}
