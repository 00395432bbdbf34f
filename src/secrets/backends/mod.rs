//! Pluggable secret backend architecture
//!
//! The cache talks to the remote store only through [`SecretBackend`]. Network
//! transports implement it outside this crate; [`InMemoryBackend`] ships here
//! for development and tests.

pub mod backend;
pub mod memory;

pub use backend::{BackendError, ChangeStream, SecretBackend};
pub use memory::InMemoryBackend;
