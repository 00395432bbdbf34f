//! HTTP surface over the secret cache.
//!
//! `GET /` answers with the username and password of the configured
//! credentials secret, doing two cache lookups per request. `GET /healthz`
//! reports the change watcher's connection state.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use routes::build_router;
pub use server::start_api_server;
