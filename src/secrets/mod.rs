//! Watch-coherent secret caching.
//!
//! This module fronts a remote key-value secret store with an in-process
//! cache. Lookups populate the cache lazily; a background watcher consumes the
//! store's change stream so cached secrets follow additions, modifications and
//! deletions without a round trip per lookup.
//!
//! # Architecture
//!
//! ```text
//! Request handlers ──get──▶ SecretCache ◀──apply── ChangeWatcher
//!                              │  ▲                     │
//!                   fetch_by_name│  │decode             │subscribe
//!                              ▼  │                     ▼
//!                          SecretBackend  ◀─────────────┘
//! ```
//!
//! - [`SecretBackend`]: boundary to the remote store (point fetch + change stream)
//! - [`RecordDecoder`]: raw field bytes to string values, per [`DecodePolicy`]
//! - [`SecretCache`]: one lock around one map; single fetch per miss
//! - [`ChangeWatcher`]: reconnecting subscription loop with capped backoff
//!
//! # Example
//!
//! ```rust,ignore
//! use secret_mirror::secrets::{ChangeWatcher, InMemoryBackend, SecretCache};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(InMemoryBackend::new("default"));
//! let cache = Arc::new(SecretCache::new("default", backend));
//! let watcher = ChangeWatcher::new(cache.clone()).start().await?;
//!
//! let username = cache.get("test-credentials", "username").await?;
//!
//! watcher.stop().await;
//! ```
//!
//! # Security Considerations
//!
//! - Values are held as [`SecretString`], which redacts Debug/Display/Serialize
//!   and zeroes memory on drop
//! - Nothing is persisted; the cache lives and dies with the process

pub mod backends;
pub mod backoff;
pub mod cache;
pub mod decoder;
pub mod error;
pub mod types;
pub mod watcher;

pub use backends::{BackendError, ChangeStream, InMemoryBackend, SecretBackend};
pub use backoff::BackoffConfig;
pub use cache::{CacheEntry, CacheUpdate, SecretCache};
pub use decoder::{DecodePolicy, RecordDecoder};
pub use error::{Result, SecretsError};
pub use types::{ChangeEvent, FieldMap, RawRecord, SecretString};
pub use watcher::{ChangeWatcher, WatchState, WatcherHandle};
