//! Sim Engine Binary
//!
//! Starts the simulated brokerage over in-memory stores.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sim-engine
//! ```
//!
//! # Environment Variables
//!
//! - `ApiKeys__0__Key` / `ApiKeys__0__Secret` / `ApiKeys__0__Name`: accepted
//!   credentials (at least one pair is required)
//! - `HTTP_PORT`: HTTP server port (default: 8080)
//! - `POSTGRES_CONNECTION_STRING` / `COSMOS_CONNECTION_STRING`: external
//!   store deployments (this binary ships the in-memory doubles)
//! - `RUST_LOG`: log filter (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use sim_engine::http::{ApiKeySet, AppState, create_router};
use sim_engine::sim::SessionController;
use sim_engine::storage::{InMemoryBarStore, InMemorySessionStore};
use sim_engine::SimConfig;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sim_engine=info")),
        )
        .init();

    let config = SimConfig::from_env();
    let auth = ApiKeySet::from_env();
    if auth.is_empty() {
        tracing::error!("no API keys configured; set ApiKeys__0__Key / ApiKeys__0__Secret");
        std::process::exit(1);
    }
    tracing::info!(keys = auth.len(), port = config.http_port, "configuration loaded");

    if config.postgres_connection.is_some() || !config.use_inmemory_sessions {
        tracing::warn!(
            "external store connection strings are configured, but this build serves the \
             in-memory stores; load bars through the ingestion tooling instead"
        );
    }

    let bars = Arc::new(InMemoryBarStore::new());
    let store = Arc::new(InMemorySessionStore::new());
    let controller = Arc::new(SessionController::new(Arc::clone(&bars), store));

    let state = AppState {
        controller,
        bars,
        auth: Arc::new(auth),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let router = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "sim-engine listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("sim-engine stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
    }
}
