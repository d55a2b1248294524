//! idrelay HTTP API Server
//!
//! REST endpoints for identity requests plus a WebSocket session endpoint
//! that pushes resolved requests to subscribed observers.

pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;
pub mod session;

use idrelay_core::config::IdentityConfig;
use server::{AppState, ServerConfig, start_server};
use tracing_subscriber::EnvFilter;

/// Start the server with the default configuration
pub async fn start() -> Result<(), Box<dyn std::error::Error>> {
    start_with_config(ServerConfig::default(), IdentityConfig::default()).await
}

/// Start the server with a custom configuration
///
/// Polling tasks run on a dedicated runtime built from
/// `identity.scheduler`; HTTP traffic stays on the caller's runtime.
pub async fn start_with_config(
    config: ServerConfig,
    identity: IdentityConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    init_tracing("info");

    let scheduler = identity.scheduler.build_runtime()?;
    let state = AppState::new(&identity, scheduler.handle().clone());
    let result = start_server(config, state).await;
    scheduler.shutdown_background();
    result
}

/// Installs the global subscriber; `RUST_LOG` takes precedence over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
