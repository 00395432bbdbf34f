//! Background change watcher.
//!
//! Keeps a [`SecretCache`] current by consuming the backend's change stream.
//! The watcher moves through three states:
//!
//! ```text
//! Disconnected ──▶ Subscribing ──▶ Streaming
//!       ▲                              │
//!       └──── stream ended / errored ──┘
//! ```
//!
//! It never settles in `Disconnected` while running: every interruption is
//! logged, counted, and followed by a resubscription gated by
//! [`BackoffConfig`]. After a successful *re*subscription the cache is cleared
//! (unless disabled), because events emitted while disconnected were lost.
//!
//! Events from one subscription are applied one at a time in arrival order.
//!
//! ## Graceful Shutdown
//!
//! [`WatcherHandle::shutdown`] signals the loop through a `watch` channel; the
//! loop exits from any state, including mid-backoff, and drops its stream.
//! Dropping the handle without calling `shutdown` detaches the watcher, which
//! then runs for the life of the runtime.

use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use super::backends::{BackendError, ChangeStream, SecretBackend};
use super::backoff::BackoffConfig;
use super::cache::SecretCache;
use super::error::{Result, SecretsError};
use super::types::ChangeEvent;
use crate::observability::MetricsRecorder;

/// Connection state of the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    Disconnected,
    Subscribing,
    Streaming,
}

impl WatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Subscribing => "subscribing",
            Self::Streaming => "streaming",
        }
    }
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a single subscription ended.
enum StreamOutcome {
    Shutdown,
    Ended { events: u64 },
    Failed { events: u64, error: BackendError },
}

/// Feeds backend change events into a [`SecretCache`].
pub struct ChangeWatcher {
    backend: Arc<dyn SecretBackend>,
    cache: Arc<SecretCache>,
    backoff: BackoffConfig,
    invalidate_on_reconnect: bool,
    state_tx: watch::Sender<WatchState>,
    metrics: MetricsRecorder,
}

impl fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("backend", &self.backend.backend_type())
            .field("scope", &self.cache.scope())
            .field("backoff", &self.backoff)
            .field("invalidate_on_reconnect", &self.invalidate_on_reconnect)
            .finish()
    }
}

impl ChangeWatcher {
    /// Create a watcher that applies events from the cache's own backend.
    pub fn new(cache: Arc<SecretCache>) -> Self {
        Self {
            backend: Arc::clone(cache.backend()),
            cache,
            backoff: BackoffConfig::default(),
            invalidate_on_reconnect: true,
            state_tx: watch::channel(WatchState::Disconnected).0,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Subscribe to state changes, including those made during [`start`](Self::start).
    pub fn state_changes(&self) -> watch::Receiver<WatchState> {
        self.state_tx.subscribe()
    }

    /// Configure the resubscription backoff.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Choose whether the cache is cleared after a resubscription.
    pub fn with_invalidate_on_reconnect(mut self, invalidate: bool) -> Self {
        self.invalidate_on_reconnect = invalidate;
        self
    }

    /// Open the initial subscription and spawn the watch loop.
    ///
    /// # Errors
    ///
    /// [`SecretsError::Subscription`] if the initial subscription cannot be
    /// established. Later failures are handled inside the loop.
    pub async fn start(self) -> Result<WatcherHandle> {
        let state_tx = self.state_tx.clone();
        let state_rx = state_tx.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.set_state(&state_tx, WatchState::Subscribing);
        let stream = self.backend.subscribe().await.map_err(|e| {
            self.set_state(&state_tx, WatchState::Disconnected);
            self.metrics.record_subscription_failure();
            warn!(
                scope = %self.cache.scope(),
                error = %e,
                "Initial change subscription failed"
            );
            SecretsError::subscription(e.to_string())
        })?;

        info!(
            scope = %self.cache.scope(),
            backend = self.backend.backend_type(),
            "Change watcher subscribed"
        );

        let task = tokio::spawn(self.run(stream, state_tx, shutdown_rx));

        Ok(WatcherHandle { shutdown_tx, state_rx, task })
    }

    async fn run(
        self,
        initial: ChangeStream,
        state_tx: watch::Sender<WatchState>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut next_stream = Some(initial);
        let mut attempt: u32 = 0;

        loop {
            if let Some(stream) = next_stream.take() {
                self.set_state(&state_tx, WatchState::Streaming);

                let span = info_span!(
                    "secret_watch",
                    scope = %self.cache.scope(),
                    subscription_id = %uuid::Uuid::new_v4()
                );
                let outcome = self.consume(stream, &mut shutdown_rx).instrument(span).await;

                self.set_state(&state_tx, WatchState::Disconnected);

                let events = match outcome {
                    StreamOutcome::Shutdown => break,
                    StreamOutcome::Ended { events } => {
                        self.metrics.record_stream_interrupted("closed");
                        warn!(
                            scope = %self.cache.scope(),
                            events,
                            "Change stream closed by backend"
                        );
                        events
                    }
                    StreamOutcome::Failed { events, error } => {
                        self.metrics.record_stream_interrupted("error");
                        warn!(
                            scope = %self.cache.scope(),
                            events,
                            error = %error,
                            "Change stream failed"
                        );
                        events
                    }
                };

                if events > 0 {
                    attempt = 0;
                }
            }

            let delay = self.backoff.backoff_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            debug!(
                scope = %self.cache.scope(),
                attempt,
                backoff_ms = delay.as_millis() as u64,
                "Waiting before resubscribing"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut shutdown_rx) => break,
            }

            self.set_state(&state_tx, WatchState::Subscribing);

            let subscribed = tokio::select! {
                result = self.backend.subscribe() => result,
                _ = shutdown_requested(&mut shutdown_rx) => break,
            };

            match subscribed {
                Ok(stream) => {
                    self.metrics.record_watch_reconnect();
                    info!(scope = %self.cache.scope(), attempt, "Change watcher resubscribed");

                    if self.invalidate_on_reconnect {
                        let invalidated = self.cache.clear().await;
                        info!(
                            scope = %self.cache.scope(),
                            invalidated,
                            "Cleared secret cache after resubscribing"
                        );
                    }
                    next_stream = Some(stream);
                }
                Err(e) => {
                    self.metrics.record_subscription_failure();
                    warn!(
                        scope = %self.cache.scope(),
                        attempt,
                        error = %e,
                        "Change resubscription failed"
                    );
                    self.set_state(&state_tx, WatchState::Disconnected);
                }
            }
        }

        self.set_state(&state_tx, WatchState::Disconnected);
        info!(scope = %self.cache.scope(), "Change watcher stopped");
    }

    async fn consume(
        &self,
        mut stream: ChangeStream,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> StreamOutcome {
        let mut events = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown_rx) => return StreamOutcome::Shutdown,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    events += 1;
                    self.handle_event(event).await;
                }
                Some(Err(error)) => return StreamOutcome::Failed { events, error },
                None => return StreamOutcome::Ended { events },
            }
        }
    }

    async fn handle_event(&self, event: ChangeEvent) {
        let kind = event.kind();
        let name = event.name().to_string();

        match self.cache.apply(event).await {
            Ok(update) => {
                self.metrics.record_watch_event(kind, true);
                debug!(name = %name, kind, ?update, "Applied change event");
            }
            Err(e) => {
                self.metrics.record_watch_event(kind, false);
                warn!(name = %name, kind, error = %e, "Failed to apply change event");
            }
        }
    }

    fn set_state(&self, state_tx: &watch::Sender<WatchState>, state: WatchState) {
        state_tx.send_replace(state);
        self.metrics.set_watch_streaming(state == WatchState::Streaming);
    }
}

/// Resolves once shutdown has been requested. Never resolves if the handle
/// was dropped without requesting shutdown.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Handle for observing and stopping a running [`ChangeWatcher`].
#[derive(Debug)]
pub struct WatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<WatchState>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Current state of the watch loop.
    pub fn state(&self) -> WatchState {
        *self.state_rx.borrow()
    }

    /// Receiver for state transitions.
    pub fn state_changes(&self) -> watch::Receiver<WatchState> {
        self.state_rx.clone()
    }

    /// Wait until the watcher reports `state`.
    pub async fn wait_for_state(&self, state: WatchState) {
        let mut rx = self.state_rx.clone();
        // Err means the loop exited; nothing left to wait for.
        let _ = rx.wait_for(|current| *current == state).await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the watch loop to stop.
    pub fn shutdown(&self) {
        info!("Initiating shutdown of change watcher");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the watch loop to exit.
    pub async fn join(self) {
        let _ = self.task.await;
    }

    /// Shutdown and wait for the loop to exit.
    pub async fn stop(self) {
        self.shutdown();
        self.join().await;
    }
}
