//! HTTP interface for ailab.
//!
//! Exposes the model registry, agent profiles and persisted chat sessions
//! as a JSON API, plus a streaming chat endpoint.  An optional static
//! directory is served for everything else, so a browser frontend can be
//! dropped next to the binary.

use std::path::PathBuf;

pub mod api;
pub mod error;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::WebServer;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
    /// Directory of static frontend files, if any.
    pub static_dir: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 3000,
            static_dir: None,
        }
    }
}
