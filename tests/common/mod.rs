//! Common test utilities for all integration tests.
//!
//! Builds a cache and watcher over the in-memory backend with short backoffs.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use secret_mirror::secrets::{
    BackoffConfig, ChangeWatcher, DecodePolicy, InMemoryBackend, RawRecord, RecordDecoder,
    SecretCache, WatcherHandle,
};

pub const SCOPE: &str = "default";

/// Backoff short enough for tests, bounded at 100ms.
pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
        multiplier: 2.0,
    }
}

pub fn credentials(username: &str, password: &str) -> RawRecord {
    RawRecord::new("test-credentials")
        .with_field("username", username)
        .with_field("password", password)
}

pub struct Harness {
    pub backend: Arc<InMemoryBackend>,
    pub cache: Arc<SecretCache>,
}

impl Harness {
    pub fn new(backend: InMemoryBackend) -> Self {
        Self::with_policy(backend, DecodePolicy::Utf8)
    }

    pub fn with_policy(backend: InMemoryBackend, policy: DecodePolicy) -> Self {
        let backend = Arc::new(backend);
        let cache = Arc::new(
            SecretCache::new(SCOPE, backend.clone()).with_decoder(RecordDecoder::new(policy)),
        );
        Self { backend, cache }
    }

    pub async fn start_watcher(&self) -> WatcherHandle {
        ChangeWatcher::new(self.cache.clone())
            .with_backoff(fast_backoff())
            .start()
            .await
            .expect("watcher should subscribe")
    }

    pub async fn value(&self, name: &str, field: &str) -> Option<String> {
        let entry = self.cache.entry(name).await?;
        entry.field(field).ok().map(|v| v.expose_secret().to_string())
    }
}

/// Poll `check` until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
