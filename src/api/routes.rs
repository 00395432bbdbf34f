use axum::{
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{credentials_handler, health_handler, AppState};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(credentials_handler))
        .route("/healthz", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
