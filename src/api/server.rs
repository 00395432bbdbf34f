use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use crate::{config::ServerConfig, errors::Error};

use super::{handlers::AppState, routes::build_router};

/// Bind the HTTP listener and serve until `shutdown` resolves.
pub async fn start_api_server<F>(
    config: &ServerConfig,
    state: AppState,
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::config(format!("Invalid API address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind API server: {}", e)))?;

    info!(address = %addr, "Starting HTTP API server");
    run_http_server(listener, state, shutdown).await?;

    info!("API server shutdown completed");
    Ok(())
}

async fn run_http_server<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::transport(format!("API server error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{InMemoryBackend, SecretCache, WatchState};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    #[tokio::test]
    async fn test_invalid_address_is_config_error() {
        let config = ServerConfig {
            host: "not an address".to_string(),
            port: 9000,
            credentials_secret: "test-credentials".to_string(),
        };
        let backend = Arc::new(InMemoryBackend::new("default"));
        let cache = Arc::new(SecretCache::new("default", backend));
        let (_tx, rx) = watch::channel(WatchState::Streaming);
        let state = AppState::new(cache, rx, "test-credentials", Duration::from_secs(1));

        let err = start_api_server(&config, state, async {}).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
