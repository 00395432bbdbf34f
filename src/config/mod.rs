//! # Configuration Management
//!
//! Environment-driven configuration for the secret-mirror service.

pub mod namespace;
pub mod settings;

pub use namespace::{NamespaceResolver, SERVICE_ACCOUNT_NAMESPACE_FILE};
pub use settings::{
    AppConfig, CacheConfig, ObservabilityConfig, ScopeConfig, ServerConfig, WatcherConfig,
};
