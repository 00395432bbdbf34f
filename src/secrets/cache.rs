//! Watch-coherent secret cache.
//!
//! The cache maps a secret name to its decoded field map and is populated
//! lazily: the first [`SecretCache::get`] for a name fetches the record from
//! the backend and keeps it. From then on the entry is only changed by change
//! events applied through [`SecretCache::apply`] (normally by the
//! [`ChangeWatcher`](super::watcher::ChangeWatcher)).
//!
//! # Locking
//!
//! One `tokio::sync::Mutex` guards the whole map, and `get` holds it across
//! the backend fetch on a miss. Concurrent callers for an uncached name
//! therefore serialize behind a single fetch instead of duplicating it, and a
//! reader never sees an entry that is only partly written.
//!
//! # Known staleness window
//!
//! Fetches and watch events are not ordered against each other. A fetch that
//! the backend answered before a `Deleted` (or `Modified`) event was emitted
//! can still be inserted after the watcher applied that event, leaving the old
//! record cached until the next event for the name. This is inherent to lazy
//! population and is not compensated for here.
//!
//! # Cancellation
//!
//! Dropping a `get` future (for example through
//! [`SecretCache::get_with_timeout`]) releases the lock. The map is only
//! written after the fetch and decode both succeed, so a cancelled lookup
//! leaves no trace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::backends::{BackendError, SecretBackend};
use super::decoder::RecordDecoder;
use super::error::{Result, SecretsError};
use super::types::{ChangeEvent, FieldMap, SecretString};
use crate::observability::MetricsRecorder;

/// Decoded, immutable view of one secret.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    name: String,
    fields: Arc<FieldMap>,
}

impl CacheEntry {
    pub fn new(name: impl Into<String>, fields: FieldMap) -> Self {
        Self { name: name.into(), fields: Arc::new(fields) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Look up one field of this secret.
    pub fn field(&self, field: &str) -> Result<SecretString> {
        self.fields
            .get(field)
            .cloned()
            .ok_or_else(|| SecretsError::field_not_found(&self.name, field))
    }
}

/// What a change event did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUpdate {
    /// A new entry was created.
    Inserted,
    /// An existing entry was replaced wholesale.
    Replaced,
    /// An existing entry was removed.
    Removed,
    /// Nothing was cached under the name; nothing changed.
    Untouched,
}

/// Lazily populated secret cache kept current by change events.
///
/// Share it behind an `Arc` between request handlers and the watcher.
pub struct SecretCache {
    scope: String,
    backend: Arc<dyn SecretBackend>,
    decoder: RecordDecoder,
    entries: Mutex<HashMap<String, CacheEntry>>,
    entry_count: AtomicUsize,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCache")
            .field("scope", &self.scope)
            .field("backend", &self.backend.backend_type())
            .field("decoder", &self.decoder.policy())
            .finish()
    }
}

impl SecretCache {
    /// Create an empty cache over `backend`, resolving names within `scope`.
    pub fn new(scope: impl Into<String>, backend: Arc<dyn SecretBackend>) -> Self {
        Self {
            scope: scope.into(),
            backend,
            decoder: RecordDecoder::default(),
            entries: Mutex::new(HashMap::new()),
            entry_count: AtomicUsize::new(0),
            metrics: MetricsRecorder::new(),
        }
    }

    /// Use a specific decoder instead of the default UTF-8 pass-through.
    pub fn with_decoder(mut self, decoder: RecordDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn decoder(&self) -> &RecordDecoder {
        &self.decoder
    }

    pub fn backend(&self) -> &Arc<dyn SecretBackend> {
        &self.backend
    }

    /// Return one field of a secret, fetching the secret on a cache miss.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::SecretNotFound`] if the backend has no such secret
    /// - [`SecretsError::FieldNotFound`] if the secret lacks `field`; the
    ///   secret itself stays cached
    /// - [`SecretsError::BackendUnavailable`] if the fetch failed
    /// - [`SecretsError::Decode`] if the fetched record is malformed
    ///
    /// Failed fetches are never cached and never retried here.
    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn get(&self, name: &str, field: &str) -> Result<SecretString> {
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get(name) {
            self.metrics.record_cache_lookup(true);
            debug!("Cache hit for secret");
            return entry.field(field);
        }

        self.metrics.record_cache_lookup(false);
        debug!("Cache miss, fetching from backend");

        let entry = self.fetch_entry(name).await?;
        let value = entry.field(field);
        entries.insert(name.to_string(), entry);
        self.record_entries(entries.len());

        value
    }

    /// [`get`](Self::get) bounded by a deadline.
    ///
    /// On expiry the in-flight fetch is dropped and
    /// [`SecretsError::Timeout`] is returned; the cache is left unchanged.
    pub async fn get_with_timeout(
        &self,
        name: &str,
        field: &str,
        timeout: Duration,
    ) -> Result<SecretString> {
        match tokio::time::timeout(timeout, self.get(name, field)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    scope = %self.scope,
                    name = %name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Secret lookup timed out"
                );
                let operation = format!("get secret '{}'", name);
                Err(SecretsError::timeout(operation, timeout.as_millis() as u64))
            }
        }
    }

    async fn fetch_entry(&self, name: &str) -> Result<CacheEntry> {
        let started = Instant::now();
        let fetched = self.backend.fetch_by_name(name).await;
        let elapsed = started.elapsed().as_secs_f64();

        let record = match fetched {
            Ok(record) => record,
            Err(e) => {
                let outcome = match e {
                    BackendError::NotFound { .. } => "not_found",
                    BackendError::Unavailable { .. } => "unavailable",
                };
                self.metrics.record_backend_fetch(outcome, elapsed);
                debug!(error = %e, "Backend fetch failed");
                return Err(e.into());
            }
        };

        match self.decoder.decode(&record) {
            Ok(fields) => {
                self.metrics.record_backend_fetch("success", elapsed);
                debug!(field_count = fields.len(), "Fetched secret from backend");
                Ok(CacheEntry::new(name, fields))
            }
            Err(e) => {
                self.metrics.record_backend_fetch("decode_error", elapsed);
                warn!(error = %e, "Fetched secret failed to decode; not caching");
                Err(e)
            }
        }
    }

    /// Apply one change event.
    ///
    /// `Added` and `Modified` insert or wholesale-replace the entry, `Deleted`
    /// removes it. The payload is decoded before the lock is taken. If it
    /// fails to decode, any existing entry for the name is dropped so the
    /// superseded value is not served, and the decode error is returned.
    pub async fn apply(&self, event: ChangeEvent) -> Result<CacheUpdate> {
        match event {
            ChangeEvent::Added(record) | ChangeEvent::Modified(record) => {
                match self.decoder.decode(&record) {
                    Ok(fields) => {
                        let entry = CacheEntry::new(record.name.clone(), fields);
                        let mut entries = self.entries.lock().await;
                        let update = match entries.insert(record.name, entry) {
                            Some(_) => CacheUpdate::Replaced,
                            None => CacheUpdate::Inserted,
                        };
                        self.record_entries(entries.len());
                        Ok(update)
                    }
                    Err(e) => {
                        let mut entries = self.entries.lock().await;
                        if entries.remove(&record.name).is_some() {
                            self.record_entries(entries.len());
                        }
                        Err(e)
                    }
                }
            }
            ChangeEvent::Deleted(name) => Ok(self.remove(&name).await),
        }
    }

    async fn remove(&self, name: &str) -> CacheUpdate {
        let mut entries = self.entries.lock().await;
        match entries.remove(name) {
            Some(_) => {
                self.record_entries(entries.len());
                CacheUpdate::Removed
            }
            None => CacheUpdate::Untouched,
        }
    }

    /// Drop one entry; the next `get` for it refetches.
    pub async fn invalidate(&self, name: &str) -> bool {
        let removed = self.remove(name).await == CacheUpdate::Removed;
        debug!(scope = %self.scope, name = %name, removed, "Invalidated cached secret");
        removed
    }

    /// Drop every entry, returning how many were held.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        self.record_entries(0);
        debug!(scope = %self.scope, count, "Cleared secret cache");
        count
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.lock().await.contains_key(name)
    }

    /// Snapshot of one cached entry, without touching the backend.
    pub async fn entry(&self, name: &str) -> Option<CacheEntry> {
        self.entries.lock().await.get(name).cloned()
    }

    /// Entry count as of the last write, read without taking the lock.
    ///
    /// May lag a write that is still in progress. Use it where blocking
    /// behind an in-flight fetch is not acceptable.
    pub fn cached_count(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    fn record_entries(&self, count: usize) {
        self.entry_count.store(count, Ordering::Relaxed);
        self.metrics.set_cache_entries(count);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
