//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.
//!
//! `RUST_LOG` takes precedence over the configured log level when set. JSON
//! output is meant for log shippers; the default is human-readable text.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Create a tracing span for request tracking.
///
/// ```rust,ignore
/// let span = request_span!("GET", "/");
/// let span = request_span!("GET", "/", secret = "test-credentials");
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4()
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Build the filter for the subscriber. `RUST_LOG` wins over `log_level`.
pub fn env_filter(log_level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|e| Error::config(format!("Invalid log level '{}': {}", log_level, e))),
    }
}

/// Install the global tracing subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = env_filter(&config.log_level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(tracing_subscriber::fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        namespace = %config.scope.namespace,
        server_address = %config.server.bind_address(),
        decode_policy = %config.cache.decode_policy,
        fetch_timeout_ms = config.cache.fetch_timeout_ms,
        seed_file = ?config.cache.seed_file,
        initial_backoff_ms = config.watcher.initial_backoff_ms,
        max_backoff_ms = config.watcher.max_backoff_ms,
        invalidate_on_reconnect = config.watcher.invalidate_on_reconnect,
        metrics_enabled = config.observability.enable_metrics,
        "secret-mirror configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = request_span!("GET", "/");
        let _span = request_span!("GET", "/", secret = "test-credentials");
    }

    #[test]
    fn test_env_filter_accepts_directives() {
        assert!(env_filter("info").is_ok());
        assert!(env_filter("secret_mirror=debug,tower_http=info").is_ok());
    }

    #[test]
    fn test_log_config_info() {
        let config = AppConfig::from_lookup(|key| {
            (key == "SECRET_MIRROR_NAMESPACE").then(|| "default".to_string())
        })
        .unwrap();

        // This should not panic
        log_config_info(&config);
    }
}
