//! planpoker - planning-poker session server
//!
//! Serves estimation rooms over length-prefixed JSON on TCP.

use std::time::Duration;

use planpoker_core::Config;
use planpoker_net::{Hub, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod state;

use state::AppState;

/// Time given to connections to flush their farewell frames
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(500);

fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting planpoker");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(AppState::new(config))) {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(state: AppState) -> planpoker_net::Result<()> {
    let hub = Hub::start(state.config.rooms.clone(), state.repo).await;
    let server = Server::start(&state.config.server, hub.clone()).await?;

    tracing::info!(addr = %server.addr(), "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to wait for shutdown signal: {}", e);
    }

    tracing::info!("Shutting down");
    server.shutdown().await;
    tokio::time::sleep(SHUTDOWN_DRAIN).await;
    hub.flush().await;

    Ok(())
}
