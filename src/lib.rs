//! # secret-mirror
//!
//! An in-process mirror of a remote key-value secret store. Secrets are fetched
//! lazily on first use and kept coherent afterwards by a background watcher that
//! applies the store's change stream (additions, modifications, deletions) to
//! the cache.
//!
//! ## Architecture
//!
//! ```text
//! HTTP API ──▶ SecretCache ◀── ChangeWatcher
//!                  │                │
//!                  ▼                ▼
//!           SecretBackend (fetch + subscribe)
//! ```
//!
//! ## Core Components
//!
//! - **Secret Cache**: one lock around one map, at most one backend fetch per miss
//! - **Change Watcher**: reconnecting subscription loop with capped exponential backoff
//! - **Record Decoder**: raw field bytes to strings under an explicit policy
//! - **HTTP API**: axum router serving the configured credentials and watcher health
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use secret_mirror::secrets::{ChangeWatcher, InMemoryBackend, SecretCache};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> secret_mirror::Result<()> {
//!     let backend = Arc::new(InMemoryBackend::new("default"));
//!     let cache = Arc::new(SecretCache::new("default", backend));
//!     let watcher = ChangeWatcher::new(cache.clone()).start().await?;
//!
//!     let _password = cache.get("test-credentials", "password").await;
//!
//!     watcher.stop().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{Error, Result};
pub use observability::init_observability;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
