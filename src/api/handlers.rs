use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tokio::sync::watch;
use tracing::Instrument;

use crate::secrets::{SecretCache, WatchState};

use super::error::ApiError;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SecretCache>,
    pub watch_state: watch::Receiver<WatchState>,
    pub credentials_secret: String,
    pub fetch_timeout: Duration,
}

impl AppState {
    pub fn new(
        cache: Arc<SecretCache>,
        watch_state: watch::Receiver<WatchState>,
        credentials_secret: impl Into<String>,
        fetch_timeout: Duration,
    ) -> Self {
        Self { cache, watch_state, credentials_secret: credentials_secret.into(), fetch_timeout }
    }
}

#[derive(Debug, Serialize)]
pub struct CredentialsResponse {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub watcher: WatchState,
    pub namespace: String,
    pub cached_secrets: usize,
}

/// Serve the username and password of the configured credentials secret.
pub async fn credentials_handler(
    State(state): State<AppState>,
) -> Result<Json<CredentialsResponse>, ApiError> {
    let span = crate::request_span!("GET", "/", secret = %state.credentials_secret);
    let credentials = fetch_credentials(&state).instrument(span).await?;
    Ok(Json(credentials))
}

async fn fetch_credentials(state: &AppState) -> Result<CredentialsResponse, ApiError> {
    let name = state.credentials_secret.as_str();
    let username = state.cache.get_with_timeout(name, "username", state.fetch_timeout).await?;
    let password = state.cache.get_with_timeout(name, "password", state.fetch_timeout).await?;

    Ok(CredentialsResponse {
        username: username.expose_secret().to_string(),
        password: password.expose_secret().to_string(),
    })
}

/// Report the watcher state. Anything but a live stream is reported as degraded.
///
/// Never waits on the cache lock, so a slow backend fetch cannot stall it.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let watcher = *state.watch_state.borrow();
    let (status_code, status) = match watcher {
        WatchState::Streaming => (StatusCode::OK, "ok"),
        WatchState::Subscribing | WatchState::Disconnected => {
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    let body = HealthResponse {
        status,
        watcher,
        namespace: state.cache.scope().to_string(),
        cached_secrets: state.cache.cached_count(),
    };

    (status_code, Json(body))
}
