//! Orb Server Library
//!
//! Range streaming, HLS manifests and listen-party coordination over a track
//! catalog and an object store.
//!
//! This library exposes the core components for testing purposes.

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod party;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use api::router;
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use party::SessionRegistry;
pub use services::{AuthService, LocalObjectStore, RangeStreamer, SqliteCatalog};
pub use state::AppState;
