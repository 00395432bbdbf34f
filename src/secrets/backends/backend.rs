//! Secret backend trait and types
//!
//! Defines the boundary to the remote key-value store: point fetches by name
//! and a change stream. Transports and authentication live behind it.

use crate::secrets::error::SecretsError;
use crate::secrets::types::{ChangeEvent, RawRecord};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Ordered stream of change events from one subscription.
///
/// The stream ends when the backend closes it; an `Err` item reports a
/// mid-stream failure.
pub type ChangeStream = BoxStream<'static, std::result::Result<ChangeEvent, BackendError>>;

/// Failures reported by a backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend has no record under this name.
    #[error("not found: {name}")]
    NotFound { name: String },

    /// Transient or permanent failure reaching the backend.
    #[error("unavailable: {message}")]
    Unavailable { message: String },
}

impl BackendError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }
}

impl From<BackendError> for SecretsError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::NotFound { name } => SecretsError::SecretNotFound { name },
            BackendError::Unavailable { message } => SecretsError::BackendUnavailable { message },
        }
    }
}

/// Trait for secret backends
///
/// Implementations are bound to one scope (namespace) at construction and
/// must be Send + Sync for use across tasks.
#[async_trait]
pub trait SecretBackend: Send + Sync + std::fmt::Debug {
    /// Fetch a secret by name within the backend's scope.
    async fn fetch_by_name(&self, name: &str) -> std::result::Result<RawRecord, BackendError>;

    /// Open a change stream for every secret in the backend's scope.
    async fn subscribe(&self) -> std::result::Result<ChangeStream, BackendError>;

    /// Short identifier used in logs.
    fn backend_type(&self) -> &'static str;
}
