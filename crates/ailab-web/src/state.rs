//! Shared application state for the web server.

use ailab_agent::ChatService;

use crate::WebConfig;

/// Shared state accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Registry, sessions and agent profiles behind one service.
    pub chat: ChatService,
    pub config: WebConfig,
}
