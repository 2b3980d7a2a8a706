//! Line chat server - Entry Point
//!
//! Parses the configuration, binds the TCP listener and serves clients
//! until Ctrl-C.

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use line_chat::{serve, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("line_chat=info")),
        )
        .init();

    // Bind address and limits from command line or defaults
    let config = Config::parse();

    // Bind failure is the one fatal error
    let listener = TcpListener::bind(&config.addr).await?;
    info!("Line chat server listening on {}", config.addr);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                ctrl_c.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    serve(listener, config, shutdown).await?;

    info!("Server stopped");
    Ok(())
}
