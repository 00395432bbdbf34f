//! Error types for secret lookups and watch-stream handling.

use thiserror::Error;

/// Result type for secrets operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors surfaced by the secret cache and the change watcher.
///
/// Callers can tell "will never succeed" ([`SecretsError::is_not_found`]) apart
/// from "try again" ([`SecretsError::is_retryable`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretsError {
    /// The backend has no record for this name. Never cached.
    #[error("Secret not found: {name}")]
    SecretNotFound { name: String },

    /// The secret exists but does not carry the requested field.
    #[error("Field '{field}' not found in secret '{name}'")]
    FieldNotFound { name: String, field: String },

    /// The backend could not be reached or answered with an error.
    #[error("Backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// A field's raw bytes could not be converted to a value.
    #[error("Failed to decode field '{field}': {reason}")]
    Decode { field: String, reason: String },

    /// The change stream could not be opened or failed mid-stream.
    #[error("Subscription error: {message}")]
    Subscription { message: String },

    /// The caller's deadline elapsed while waiting on the backend.
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },
}

impl SecretsError {
    /// Create a secret not found error.
    pub fn secret_not_found(name: impl Into<String>) -> Self {
        Self::SecretNotFound { name: name.into() }
    }

    /// Create a field not found error.
    pub fn field_not_found(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::FieldNotFound { name: name.into(), field: field.into() }
    }

    /// Create a backend unavailable error.
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable { message: message.into() }
    }

    /// Create a decode error.
    pub fn decode(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode { field: field.into(), reason: reason.into() }
    }

    /// Create a subscription error.
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::Subscription { message: message.into() }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// True when retrying the same lookup cannot succeed until the backend changes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SecretNotFound { .. } | Self::FieldNotFound { .. })
    }

    /// True when the failure is transient and the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::Subscription { .. } | Self::Timeout { .. }
        )
    }
}
