//! Connection acceptor
//!
//! Starts the coordinator, accepts connections and spawns one handler task
//! per connection until `shutdown` is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::AppError;
use crate::handler::handle_connection;

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long to wait for connections to wind down after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Serve chat clients on an already-bound listener
///
/// Accept errors are logged and retried; connection errors are logged and
/// only close that connection. Returns after `shutdown` is cancelled and
/// the coordinator has stopped (or the grace period ran out).
pub async fn serve(
    listener: TcpListener,
    config: Config,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let config = Arc::new(config);
    let (coordinator, handle) = Coordinator::new(&config);
    let coordinator_task = tokio::spawn(coordinator.run());

    info!("Accepting connections on {}", listener.local_addr()?);

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let handle = handle.clone();
                let config = Arc::clone(&config);
                let shutdown = shutdown.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, handle, config, shutdown).await {
                        error!("Connection {} closed with error: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    info!("Acceptor stopped, waiting for connections to close");
    drop(handle);

    if timeout(SHUTDOWN_GRACE, coordinator_task).await.is_err() {
        warn!("Connections still open after {:?}", SHUTDOWN_GRACE);
    }

    Ok(())
}
