//! # Error Handling
//!
//! Application-level errors for startup, configuration and serving. Cache and
//! watcher failures carry their own [`SecretsError`] taxonomy and convert into
//! [`Error::Secrets`].

use crate::secrets::SecretsError;

/// Custom result type for application operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the secret-mirror service
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration values failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network transport errors (HTTP listener, metrics exporter)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Secret lookup or watch errors
    #[error(transparent)]
    Secrets(#[from] SecretsError),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::validation(format!("Validation failed: {}", errors))
    }
}
