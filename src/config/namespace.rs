//! Scope (namespace) resolution.
//!
//! Every secret name is resolved inside one namespace chosen once at startup.
//! An explicitly configured namespace wins; otherwise the namespace of the
//! pod's service account is read from the file the orchestrator mounts.

use crate::errors::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File holding the namespace of the running pod's service account.
pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Resolves the namespace under which all secrets are looked up.
#[derive(Debug, Clone)]
pub struct NamespaceResolver {
    explicit: Option<String>,
    namespace_file: PathBuf,
}

impl Default for NamespaceResolver {
    fn default() -> Self {
        Self { explicit: None, namespace_file: PathBuf::from(SERVICE_ACCOUNT_NAMESPACE_FILE) }
    }
}

impl NamespaceResolver {
    pub fn new(explicit: Option<String>) -> Self {
        Self { explicit, ..Default::default() }
    }

    /// Read the fallback namespace from `path` instead of the service account file.
    pub fn with_namespace_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.namespace_file = path.into();
        self
    }

    pub fn namespace_file(&self) -> &Path {
        &self.namespace_file
    }

    /// Pick the explicit namespace, or fall back to the service account file.
    pub fn resolve(&self) -> Result<String> {
        if let Some(namespace) = self.explicit.as_deref().map(str::trim) {
            if !namespace.is_empty() {
                debug!(namespace, "Using explicitly configured namespace");
                return Ok(namespace.to_string());
            }
        }

        let contents = std::fs::read_to_string(&self.namespace_file).map_err(|e| {
            Error::config(format!(
                "error reading {}; can't determine own namespace: {}",
                self.namespace_file.display(),
                e
            ))
        })?;

        let namespace = contents.trim();
        if namespace.is_empty() {
            return Err(Error::config(format!(
                "namespace file {} is empty",
                self.namespace_file.display()
            )));
        }

        debug!(
            namespace,
            path = %self.namespace_file.display(),
            "Resolved namespace from service account"
        );
        Ok(namespace.to_string())
    }
}
