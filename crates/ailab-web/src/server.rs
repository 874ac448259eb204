//! Router assembly and startup.

use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use ailab_agent::ChatService;

use crate::WebConfig;
use crate::api;
use crate::state::AppState;

/// The ailab web server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: WebConfig, chat: ChatService) -> Self {
        let state = Arc::new(AppState {
            chat,
            config: config.clone(),
        });
        Self { config, state }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any);

        let router = Router::new()
            .route("/api/models", get(api::models))
            .route("/api/agents", get(api::list_agents).post(api::save_agent))
            .route("/api/agents/{id}", delete(api::delete_agent))
            .route("/api/sessions", get(api::list_sessions))
            .route(
                "/api/sessions/{id}",
                get(api::get_session).delete(api::delete_session),
            )
            .route("/api/search", get(api::search))
            .route("/api/chat", post(api::chat))
            .route("/api/generate-title", post(api::title));

        let router = match &self.config.static_dir {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router,
        };

        router.layer(cors).with_state(Arc::clone(&self.state))
    }

    /// Bind the listener and serve until the process is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.addr();
        let router = self.router();

        tracing::info!(
            addr = %addr,
            static_dir = ?self.config.static_dir,
            models = self.state.chat.registry().models().len(),
            "starting web server"
        );

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router).await?;
        Ok(())
    }
}
