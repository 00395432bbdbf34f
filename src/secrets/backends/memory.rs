//! In-memory secrets backend implementation.
//!
//! Holds records in a map and fans every write out to live subscribers as
//! change events. It is intended for **development and testing only**: it
//! exercises the same seams a networked backend would, and exposes knobs to
//! simulate latency, outages and dropped watch streams.
//!
//! # Seed file
//!
//! [`InMemoryBackend::from_seed_file`] loads a JSON object of secrets:
//!
//! ```json
//! { "test-credentials": { "username": "alice", "password": "hunter2" } }
//! ```
//!
//! Values are stored as their UTF-8 bytes, so with the base64 decode policy
//! the file must hold base64 text.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use super::backend::{BackendError, ChangeStream, SecretBackend};
use crate::secrets::types::{ChangeEvent, RawRecord};

type EventSender = mpsc::UnboundedSender<std::result::Result<ChangeEvent, BackendError>>;

#[derive(Default)]
struct State {
    records: HashMap<String, RawRecord>,
    subscribers: Vec<EventSender>,
}

impl State {
    fn broadcast(&mut self, event: std::result::Result<ChangeEvent, BackendError>) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// In-memory secret store with a live change feed (development only).
pub struct InMemoryBackend {
    scope: String,
    state: Mutex<State>,
    fetch_delay: Duration,
    subscribe_delay: Duration,
    unavailable: AtomicBool,
    failing_subscriptions: AtomicUsize,
    fetch_count: AtomicUsize,
    subscribe_count: AtomicUsize,
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("scope", &self.scope)
            .field("fetch_delay", &self.fetch_delay)
            .field("fetch_count", &self.fetch_count())
            .field("subscribe_count", &self.subscribe_count())
            .finish()
    }
}

impl InMemoryBackend {
    /// Create an empty backend for the given scope.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            state: Mutex::new(State::default()),
            fetch_delay: Duration::ZERO,
            subscribe_delay: Duration::ZERO,
            unavailable: AtomicBool::new(false),
            failing_subscriptions: AtomicUsize::new(0),
            fetch_count: AtomicUsize::new(0),
            subscribe_count: AtomicUsize::new(0),
        }
    }

    /// Delay every fetch by `delay` to simulate a slow round trip.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Delay every subscribe call by `delay`.
    pub fn with_subscribe_delay(mut self, delay: Duration) -> Self {
        self.subscribe_delay = delay;
        self
    }

    /// Pre-populate records without emitting events.
    pub fn with_records(mut self, records: impl IntoIterator<Item = RawRecord>) -> Self {
        {
            let state = self.state.get_mut();
            for record in records {
                state.records.insert(record.name.clone(), record);
            }
        }
        self
    }

    /// Load records from a JSON seed file.
    pub fn from_seed_file(
        scope: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> std::io::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let seed: HashMap<String, HashMap<String, String>> = serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let records = seed.into_iter().map(|(name, fields)| RawRecord {
            name,
            data: fields.into_iter().map(|(k, v)| (k, v.into_bytes())).collect(),
        });

        let backend = Self::new(scope).with_records(records);
        info!(
            path = %path.display(),
            scope = %backend.scope,
            "Loaded in-memory secret backend from seed file"
        );
        Ok(backend)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Create or replace a record, emitting `Added` or `Modified`.
    pub async fn put(&self, record: RawRecord) {
        let mut state = self.state.lock().await;
        let existed = state.records.insert(record.name.clone(), record.clone()).is_some();
        let event =
            if existed { ChangeEvent::Modified(record) } else { ChangeEvent::Added(record) };
        debug!(name = %event.name(), kind = event.kind(), "In-memory backend write");
        state.broadcast(Ok(event));
    }

    /// Replace a record without notifying subscribers.
    pub async fn put_silently(&self, record: RawRecord) {
        let mut state = self.state.lock().await;
        state.records.insert(record.name.clone(), record);
    }

    /// Remove a record, emitting `Deleted` if it existed.
    pub async fn delete(&self, name: &str) {
        let mut state = self.state.lock().await;
        if state.records.remove(name).is_some() {
            state.broadcast(Ok(ChangeEvent::Deleted(name.to_string())));
        }
    }

    /// Send an arbitrary event to every subscriber without touching records.
    pub async fn emit(&self, event: ChangeEvent) {
        self.state.lock().await.broadcast(Ok(event));
    }

    /// Close every live change stream.
    pub async fn disconnect_all(&self) {
        let mut state = self.state.lock().await;
        let closed = state.subscribers.len();
        state.subscribers.clear();
        debug!(closed, "In-memory backend closed all change streams");
    }

    /// Deliver an error to every live stream, then close them.
    pub async fn fail_streams(&self, message: &str) {
        let mut state = self.state.lock().await;
        state.broadcast(Err(BackendError::unavailable(message)));
        state.subscribers.clear();
    }

    /// Make the next `count` subscribe calls fail.
    pub fn fail_next_subscriptions(&self, count: usize) {
        self.failing_subscriptions.store(count, Ordering::SeqCst);
    }

    /// Toggle whether fetches fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Number of subscribe calls so far, including failed ones.
    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    /// Number of streams still open.
    pub async fn live_subscribers(&self) -> usize {
        let mut state = self.state.lock().await;
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

#[async_trait]
impl SecretBackend for InMemoryBackend {
    async fn fetch_by_name(&self, name: &str) -> std::result::Result<RawRecord, BackendError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable("in-memory backend marked unavailable"));
        }

        let state = self.state.lock().await;
        state.records.get(name).cloned().ok_or_else(|| BackendError::not_found(name))
    }

    async fn subscribe(&self) -> std::result::Result<ChangeStream, BackendError> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        if !self.subscribe_delay.is_zero() {
            tokio::time::sleep(self.subscribe_delay).await;
        }

        let should_fail = self
            .failing_subscriptions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BackendError::unavailable("in-memory backend refused subscription"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().await.subscribers.push(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    fn backend_type(&self) -> &'static str {
        "in_memory"
    }
}
