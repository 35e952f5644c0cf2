mod http;
mod observability;
mod ws;

use anyhow::Result;
use clap::Parser;
use conclave_core::{logging, Config, ResourceTracker, RoomRegistry, SessionController};
use conclave_sfu::HttpSfuClient;
use std::sync::Arc;
use tracing::{error, info};

/// Signaling and session-orchestration server for an external SFU
#[derive(Debug, Parser)]
#[command(name = "conclave-api", version)]
struct Cli {
    /// Path to a config file; environment variables (CONCLAVE_*) override it
    #[arg(long, env = "CONCLAVE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}");
        eprintln!("Using default configuration");
        Config::default()
    });
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    // Initialize logging
    logging::init_logging(&config.logging)?;

    info!("Conclave signaling server starting...");
    info!("HTTP address: {}", config.http_address());
    info!("SFU control API: {}", config.sfu.base_url);

    // Wire up the core: registry, tracker, SFU client, session controller
    let registry = Arc::new(RoomRegistry::new(&config.limits));
    let tracker = Arc::new(ResourceTracker::new());
    let sfu = Arc::new(
        HttpSfuClient::new(&config.sfu)
            .map_err(|e| anyhow::anyhow!("Failed to build SFU client: {e}"))?,
    );
    let session = Arc::new(SessionController::new(registry, tracker, sfu));

    let state = http::AppState::new(session.clone());
    let router = http::create_router(state);

    let http_address = config.http_address();
    let listener = tokio::net::TcpListener::bind(&http_address).await?;
    info!("HTTP server listening on {}", http_address);

    // Open WebSockets keep a graceful drain alive indefinitely, so shut
    // down on the signal directly and tear rooms down ourselves.
    tokio::select! {
        result = axum::serve(listener, router) => {
            result?;
            error!("HTTP server stopped unexpectedly");
        }
        () = shutdown_signal() => {}
    }

    // Release every SFU-side resource we still own before exiting.
    info!("Shutting down, tearing down remaining rooms...");
    let deleted = session.shutdown().await;
    info!(deleted, "Shutdown complete");

    Ok(())
}

/// Resolve on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
