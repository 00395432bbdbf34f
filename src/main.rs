use std::sync::Arc;

use secret_mirror::{
    api::{start_api_server, AppState},
    config::AppConfig,
    observability::{init_observability, log_config_info},
    secrets::{ChangeWatcher, InMemoryBackend, RecordDecoder, SecretCache},
    Result, APP_NAME, VERSION,
};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before any config is read from environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = AppConfig::from_env()?;
    init_observability(&config.observability)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting secret mirror");
    log_config_info(&config);

    let namespace = config.scope.namespace.clone();
    let backend = match &config.cache.seed_file {
        Some(path) => {
            let backend = InMemoryBackend::from_seed_file(namespace.clone(), path)?;
            info!(path = %path.display(), "Seeded in-memory secret backend");
            backend
        }
        None => InMemoryBackend::new(namespace.clone()),
    };

    let cache = Arc::new(
        SecretCache::new(namespace, Arc::new(backend))
            .with_decoder(RecordDecoder::new(config.cache.decode_policy)),
    );

    let watcher = ChangeWatcher::new(cache.clone())
        .with_backoff(config.watcher.backoff())
        .with_invalidate_on_reconnect(config.watcher.invalidate_on_reconnect)
        .start()
        .await?;

    let state = AppState::new(
        cache,
        watcher.state_changes(),
        config.server.credentials_secret.clone(),
        config.cache.fetch_timeout(),
    );

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Shutdown signal listener failed");
        }
    };

    let served = start_api_server(&config.server, state, shutdown).await;

    watcher.stop().await;
    info!("Secret mirror stopped");
    served
}
