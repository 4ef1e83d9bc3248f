//! hookbridge web server and REST API.
//!
//! Provides an Axum-based HTTP server with:
//! - The GitHub webhook receiver (`POST /github-webhook`)
//! - Status and health endpoints
//! - Job listing API
//! - Delivery audit log API

pub mod api;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use hookbridge_core::config::WebConfig;
use hookbridge_core::db::Database;
use hookbridge_core::jobs::JobRegistry;
use hookbridge_core::processor::WebhookProcessor;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub processor: WebhookProcessor,
    pub registry: Arc<JobRegistry>,
    pub db: Arc<Database>,
}

/// The web server.
pub struct WebServer {
    state: Arc<AppState>,
    listen: String,
    max_body_bytes: usize,
}

impl WebServer {
    /// Create a new web server with the given dependencies.
    pub fn new(config: &WebConfig, state: AppState) -> Self {
        Self {
            state: Arc::new(state),
            listen: config.listen.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// The full application router with middleware applied.
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.max_body_bytes)
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self.listen.parse()?;
        let app = self.router();

        info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("web server stopped");
        Ok(())
    }
}

pub fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        // API routes
        .merge(api::status::routes())
        .merge(api::jobs::routes())
        .merge(api::deliveries::routes())
        .merge(api::webhooks::routes())
        // Middleware
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
