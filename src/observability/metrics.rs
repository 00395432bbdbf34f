//! # Metrics Collection
//!
//! Prometheus metrics for the secret cache and the change watcher. Recording
//! goes through the `metrics` facade, so every call is a no-op until
//! [`init_metrics`] installs an exporter.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder that tracks cache and watcher activity
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a cache lookup outcome
    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        counter!("secret_cache_lookups_total", "result" => result).increment(1);
    }

    /// Record a backend fetch triggered by a cache miss
    pub fn record_backend_fetch(&self, outcome: &'static str, duration: f64) {
        counter!("secret_backend_fetches_total", "outcome" => outcome).increment(1);
        histogram!("secret_backend_fetch_duration_seconds").record(duration);
    }

    /// Update the number of cached secrets
    pub fn set_cache_entries(&self, entries: usize) {
        gauge!("secret_cache_entries").set(entries as f64);
    }

    /// Record a change event taken off the watch stream
    pub fn record_watch_event(&self, kind: &'static str, applied: bool) {
        let status = if applied { "applied" } else { "rejected" };
        counter!("secret_watch_events_total", "kind" => kind, "status" => status).increment(1);
    }

    /// Record a failed subscribe attempt
    pub fn record_subscription_failure(&self) {
        counter!("secret_watch_subscription_failures_total").increment(1);
    }

    /// Record a watch stream that ended or errored
    pub fn record_stream_interrupted(&self, reason: &'static str) {
        counter!("secret_watch_stream_interruptions_total", "reason" => reason).increment(1);
    }

    /// Record a successful resubscription after an interruption
    pub fn record_watch_reconnect(&self) {
        counter!("secret_watch_reconnects_total").increment(1);
    }

    /// Flag whether the watcher currently holds a live stream
    pub fn set_watch_streaming(&self, streaming: bool) {
        gauge!("secret_watch_streaming").set(if streaming { 1.0 } else { 0.0 });
    }

    fn describe(&self) {
        describe_counter!("secret_cache_lookups_total", "Cache lookups by hit/miss");
        describe_counter!(
            "secret_backend_fetches_total",
            "Backend fetches issued on cache miss, by outcome"
        );
        describe_histogram!(
            "secret_backend_fetch_duration_seconds",
            metrics::Unit::Seconds,
            "Latency of backend fetches issued on cache miss"
        );
        describe_gauge!("secret_cache_entries", "Number of secrets held in the cache");
        describe_counter!("secret_watch_events_total", "Change events by kind and status");
        describe_counter!(
            "secret_watch_subscription_failures_total",
            "Subscribe attempts that failed"
        );
        describe_counter!(
            "secret_watch_stream_interruptions_total",
            "Watch streams that ended or errored"
        );
        describe_counter!("secret_watch_reconnects_total", "Successful resubscriptions");
        describe_gauge!("secret_watch_streaming", "1 while the watcher holds a live stream");
    }
}

/// Initialize metrics collection and Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().describe();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        let recorder = MetricsRecorder::new();
        recorder.record_cache_lookup(true);
        recorder.record_cache_lookup(false);
        recorder.record_backend_fetch("success", 0.01);
        recorder.set_cache_entries(3);
        recorder.record_watch_event("modified", true);
        recorder.record_subscription_failure();
        recorder.record_stream_interrupted("closed");
        recorder.record_watch_reconnect();
        recorder.set_watch_streaming(true);
    }

    #[test]
    fn test_init_metrics_disabled() {
        let config = ObservabilityConfig { enable_metrics: false, ..Default::default() };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_init_metrics_without_port_is_skipped() {
        let config =
            ObservabilityConfig { enable_metrics: true, metrics_port: 0, ..Default::default() };
        assert!(init_metrics(&config).is_ok());
    }
}
