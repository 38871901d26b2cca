//! Server lifecycle management
//!
//! Runs the HTTP/WebSocket server and tears down every client on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use relaycast_api::{create_router, AppState};
use relaycast_core::Config;
use relaycast_signal::SignalHub;

/// Upper bound on waiting for the HTTP server after the hub is torn down
const HTTP_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RelayServer {
    config: Config,
    hub: Arc<SignalHub>,
}

impl RelayServer {
    pub const fn new(config: Config, hub: Arc<SignalHub>) -> Self {
        Self { config, hub }
    }

    /// Start the HTTP server and wait for it to stop or for a shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        let http_address = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;
        info!("HTTP server listening on {}", http_address);

        let router = create_router(AppState::new(self.hub.clone(), &self.config));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut http_handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        tokio::select! {
            _ = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
                self.hub.shutdown().await;
                return Ok(());
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
            }
        }

        // Stop accepting, then close every control channel so upgraded
        // sockets finish and the server can drain
        let _ = shutdown_tx.send(true);
        self.shutdown().await;

        if tokio::time::timeout(HTTP_DRAIN_TIMEOUT, http_handle).await.is_err() {
            warn!("HTTP server did not drain within {:?}", HTTP_DRAIN_TIMEOUT);
        }

        Ok(())
    }

    async fn shutdown(&self) {
        info!("Shutting down relaycast server...");

        let stats = self.hub.stats().await;
        if stats.clients > 0 {
            info!(
                clients = stats.clients,
                active_sessions = stats.active_sessions,
                "Tearing down connected clients"
            );
        }
        if let Some(output) = &stats.output {
            info!(owner = %output.owner, plan = %output.plan, "Stopping encoder");
        }

        self.hub.shutdown().await;
        info!("relaycast server shut down");
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
