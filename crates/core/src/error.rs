//! Error types for the ContextOS domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! `Error` is what engine operations return; `ServiceError` is what the
//! remote enrichment service adapter returns before the engine maps it.

use thiserror::Error;

/// The top-level error type for all engine operations.
///
/// Every variant leaves the engine in a well-defined state (`idle` or
/// `failed`) from which the user can retry.
#[derive(Debug, Error)]
pub enum Error {
    // --- Local input errors ---
    #[error("Validation error: {0}")]
    Validation(String),

    // --- Credential errors ---
    #[error("Configuration error: {0}")]
    Configuration(String),

    // --- Remote service errors ---
    #[error("Remote error: {0}")]
    Remote(String),

    // --- Poll ceiling reached ---
    #[error("Prompt processing timed out after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    // --- Persistence ---
    #[error("Storage error: {0}")]
    Storage(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a `Remote` error from a service failure, preferring the
    /// server-provided message over the per-operation fallback.
    pub fn remote(err: &ServiceError, fallback: &str) -> Self {
        Error::Remote(
            err.server_message()
                .map(str::to_string)
                .unwrap_or_else(|| fallback.to_string()),
        )
    }

    /// The text surfaced to the presentation layer as the current error.
    pub fn message(&self) -> String {
        match self {
            Error::Validation(m)
            | Error::Configuration(m)
            | Error::Remote(m)
            | Error::Storage(m)
            | Error::Internal(m) => m.clone(),
            Error::Timeout { .. } => "Prompt processing timed out".into(),
            Error::Serialization(e) => e.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reported by the remote enrichment service adapter.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Non-2xx response. `message` is the body's `error` field when present.
    #[error("Request failed with status {status_code}: {}", message.as_deref().unwrap_or("no message"))]
    Status {
        status_code: u16,
        message: Option<String>,
    },

    /// The credential was rejected by the service.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Network error: {0}")]
    Network(String),

    /// A 2xx response whose body did not match the contract.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// The message the server supplied, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ServiceError::Status { message, .. } => message.as_deref(),
            ServiceError::InvalidCredential(m) => Some(m.as_str()),
            ServiceError::Network(_) | ServiceError::Malformed(_) => None,
        }
    }

    pub fn is_invalid_credential(&self) -> bool {
        matches!(self, ServiceError::InvalidCredential(_))
    }
}
