//! # Configuration Settings
//!
//! Defines the configuration structure for the secret-mirror service. Values
//! come from `SECRET_MIRROR_*` environment variables (optionally loaded from a
//! `.env` file first) and are validated once at startup.

use crate::errors::{Error, Result};
use crate::secrets::{BackoffConfig, DecodePolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

use super::namespace::NamespaceResolver;

const ENV_PREFIX: &str = "SECRET_MIRROR_";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// Namespace every secret name is resolved in
    #[validate(nested)]
    pub scope: ScopeConfig,

    /// Secret cache configuration
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Change watcher configuration
    #[validate(nested)]
    pub watcher: WatcherConfig,

    /// HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a full variable name
    /// (e.g. `SECRET_MIRROR_PORT`) to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource { lookup: &lookup };

        let mut resolver = NamespaceResolver::new(env.string("NAMESPACE"));
        if let Some(path) = env.string("NAMESPACE_FILE") {
            resolver = resolver.with_namespace_file(path);
        }
        let scope = ScopeConfig { namespace: resolver.resolve()? };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            decode_policy: env.parse("DECODE_POLICY")?.unwrap_or(cache_defaults.decode_policy),
            fetch_timeout_ms: env
                .parse("FETCH_TIMEOUT_MS")?
                .unwrap_or(cache_defaults.fetch_timeout_ms),
            seed_file: env.string("SEED_FILE").map(PathBuf::from),
        };

        let watcher_defaults = WatcherConfig::default();
        let watcher = WatcherConfig {
            initial_backoff_ms: env
                .parse("WATCH_INITIAL_BACKOFF_MS")?
                .unwrap_or(watcher_defaults.initial_backoff_ms),
            max_backoff_ms: env
                .parse("WATCH_MAX_BACKOFF_MS")?
                .unwrap_or(watcher_defaults.max_backoff_ms),
            backoff_multiplier: env
                .parse("WATCH_BACKOFF_MULTIPLIER")?
                .unwrap_or(watcher_defaults.backoff_multiplier),
            invalidate_on_reconnect: env
                .parse("WATCH_INVALIDATE_ON_RECONNECT")?
                .unwrap_or(watcher_defaults.invalidate_on_reconnect),
        };

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: env.string("HOST").unwrap_or(server_defaults.host),
            port: env.parse("PORT")?.unwrap_or(server_defaults.port),
            credentials_secret: env
                .string("CREDENTIALS_SECRET")
                .unwrap_or(server_defaults.credentials_secret),
        };

        let observability_defaults = ObservabilityConfig::default();
        let observability = ObservabilityConfig {
            enable_metrics: env
                .parse("ENABLE_METRICS")?
                .unwrap_or(observability_defaults.enable_metrics),
            metrics_port: env.parse("METRICS_PORT")?.unwrap_or(observability_defaults.metrics_port),
            service_name: env
                .string("SERVICE_NAME")
                .unwrap_or(observability_defaults.service_name),
            log_level: env.string("LOG_LEVEL").unwrap_or(observability_defaults.log_level),
            json_logging: env.parse("JSON_LOGS")?.unwrap_or(observability_defaults.json_logging),
        };

        let config = Self { scope, cache, watcher, server, observability };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if self.watcher.max_backoff_ms < self.watcher.initial_backoff_ms {
            return Err(Error::validation(
                "Watch max backoff must not be smaller than the initial backoff",
            ));
        }

        if self.observability.enable_metrics && self.observability.metrics_port == self.server.port
        {
            return Err(Error::validation("Server and metrics ports cannot be the same"));
        }

        Ok(())
    }
}

struct EnvSource<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", ENV_PREFIX, key)).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    Error::config(format!("Invalid {}{} '{}': {}", ENV_PREFIX, key, raw, e))
                })
            })
            .transpose()
    }
}

/// Scope configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScopeConfig {
    /// Namespace all secret names are resolved in
    #[validate(length(min = 1, max = 253, message = "Namespace must be 1-253 characters"))]
    pub namespace: String,
}

/// Secret cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// How raw field bytes are decoded
    pub decode_policy: DecodePolicy,

    /// Deadline for one lookup, including a backend fetch on miss
    #[validate(range(
        min = 1,
        max = 300000,
        message = "Fetch timeout must be between 1ms and 300s"
    ))]
    pub fetch_timeout_ms: u64,

    /// JSON file seeding the in-memory development backend
    pub seed_file: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { decode_policy: DecodePolicy::default(), fetch_timeout_ms: 5000, seed_file: None }
    }
}

impl CacheConfig {
    /// Get fetch timeout as Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Change watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WatcherConfig {
    /// Delay before the first resubscription attempt
    #[validate(range(min = 1, message = "Initial backoff must be at least 1ms"))]
    pub initial_backoff_ms: u64,

    /// Upper bound for the resubscription delay
    #[validate(range(
        min = 1,
        max = 3600000,
        message = "Max backoff must be between 1ms and 1 hour"
    ))]
    pub max_backoff_ms: u64,

    /// Growth factor between consecutive attempts
    #[validate(range(min = 1.0, max = 10.0, message = "Multiplier must be between 1.0 and 10.0"))]
    pub backoff_multiplier: f64,

    /// Clear the cache after resubscribing, since missed events are lost
    pub invalidate_on_reconnect: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            initial_backoff_ms: backoff.initial_backoff.as_millis() as u64,
            max_backoff_ms: backoff.max_backoff.as_millis() as u64,
            backoff_multiplier: backoff.multiplier,
            invalidate_on_reconnect: true,
        }
    }
}

impl WatcherConfig {
    /// Backoff policy derived from this configuration
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Secret served by the credentials endpoint
    #[validate(length(min = 1, message = "Credentials secret name cannot be empty"))]
    pub credentials_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            credentials_secret: "test-credentials".to_string(),
        }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    /// Service name attached to metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 9090,
            service_name: "secret-mirror".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_explicit_namespace() {
        let config = AppConfig::from_lookup(lookup(&[("SECRET_MIRROR_NAMESPACE", "payments")]))
            .unwrap();

        assert_eq!(config.scope.namespace, "payments");
        assert_eq!(config.cache.decode_policy, DecodePolicy::Utf8);
        assert_eq!(config.cache.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.server.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.server.credentials_secret, "test-credentials");
        assert_eq!(config.watcher.backoff(), BackoffConfig::default());
        assert!(config.watcher.invalidate_on_reconnect);
        assert!(!config.observability.enable_metrics);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SECRET_MIRROR_NAMESPACE", "payments"),
            ("SECRET_MIRROR_DECODE_POLICY", "base64"),
            ("SECRET_MIRROR_PORT", "8080"),
            ("SECRET_MIRROR_WATCH_INITIAL_BACKOFF_MS", "100"),
            ("SECRET_MIRROR_WATCH_MAX_BACKOFF_MS", "2000"),
            ("SECRET_MIRROR_WATCH_BACKOFF_MULTIPLIER", "1.5"),
            ("SECRET_MIRROR_WATCH_INVALIDATE_ON_RECONNECT", "false"),
            ("SECRET_MIRROR_SEED_FILE", "/etc/secret-mirror/seed.json"),
        ]))
        .unwrap();

        assert_eq!(config.cache.decode_policy, DecodePolicy::Base64);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.watcher.backoff().initial_backoff, Duration::from_millis(100));
        assert_eq!(config.watcher.backoff().max_backoff, Duration::from_secs(2));
        assert_eq!(config.watcher.backoff().multiplier, 1.5);
        assert!(!config.watcher.invalidate_on_reconnect);
        assert_eq!(config.cache.seed_file, Some(PathBuf::from("/etc/secret-mirror/seed.json")));
    }

    #[test]
    fn test_unparseable_value_is_config_error() {
        let err = AppConfig::from_lookup(lookup(&[
            ("SECRET_MIRROR_NAMESPACE", "payments"),
            ("SECRET_MIRROR_PORT", "ninety"),
        ]))
        .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("SECRET_MIRROR_PORT"));
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let err = AppConfig::from_lookup(lookup(&[
            ("SECRET_MIRROR_NAMESPACE", "payments"),
            ("SECRET_MIRROR_WATCH_INITIAL_BACKOFF_MS", "5000"),
            ("SECRET_MIRROR_WATCH_MAX_BACKOFF_MS", "100"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validation_rejects_small_multiplier() {
        let err = AppConfig::from_lookup(lookup(&[
            ("SECRET_MIRROR_NAMESPACE", "payments"),
            ("SECRET_MIRROR_WATCH_BACKOFF_MULTIPLIER", "0.5"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validation_rejects_port_clash() {
        let err = AppConfig::from_lookup(lookup(&[
            ("SECRET_MIRROR_NAMESPACE", "payments"),
            ("SECRET_MIRROR_ENABLE_METRICS", "true"),
            ("SECRET_MIRROR_METRICS_PORT", "9000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_namespace_from_file_when_not_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("namespace");
        std::fs::write(&path, "team-a\n").unwrap();

        let path_str = path.to_string_lossy().to_string();
        let config =
            AppConfig::from_lookup(lookup(&[("SECRET_MIRROR_NAMESPACE_FILE", &path_str)]))
                .unwrap();
        assert_eq!(config.scope.namespace, "team-a");
    }

    #[test]
    fn test_metrics_bind_address() {
        let mut config = ObservabilityConfig::default();
        assert_eq!(config.metrics_bind_address(), Some("0.0.0.0:9090".to_string()));
        config.metrics_port = 0;
        assert_eq!(config.metrics_bind_address(), None);
    }
}
