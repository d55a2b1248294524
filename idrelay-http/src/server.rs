use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use idrelay_core::{config::IdentityConfig, service::IdentityService};
use tokio::runtime::Handle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes::create_api_router;
use crate::session::SessionManager;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IdentityService>,
    pub sessions: SessionManager,
}

impl AppState {
    /// Builds the identity service with WebSocket delivery; polling runs on
    /// `runtime`.
    pub fn new(config: &IdentityConfig, runtime: Handle) -> Self {
        let sessions = SessionManager::new();
        let service = IdentityService::new(config, Arc::new(sessions.clone()), runtime);
        Self {
            service: Arc::new(service),
            sessions,
        }
    }
}

/// Router with all routes, middleware and state applied
pub fn create_app(state: AppState) -> Router {
    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the HTTP server and serve until ctrl-c
pub async fn start_server(
    config: ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error>> {
    state.service.start().await;
    let service = state.service.clone();
    let app = create_app(state);

    // Parse the socket address
    let addr = format!("{}:{}", config.host, config.port).parse::<SocketAddr>()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
