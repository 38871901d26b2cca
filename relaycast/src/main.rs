mod server;

use anyhow::Result;
use tracing::info;

use relaycast_core::{
    bootstrap::{load_config, prepare_directories},
    logging,
};
use relaycast_signal::SignalHub;

use server::RelayServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("relaycast server starting...");
    info!("HTTP address: {}", config.http_address());
    info!("Encoder: {}", config.transcode.ffmpeg_path);

    // 3. Capture and output directories must exist before any client connects
    prepare_directories(&config)?;

    // 4. Build the signaling hub (WebRTC transports + ffmpeg launcher)
    let hub = SignalHub::from_config(&config);
    info!(
        stun_servers = config.webrtc.stun_servers.len(),
        "Signaling hub initialized"
    );

    // 5. Serve until a shutdown signal arrives
    RelayServer::new(config, hub).start().await
}
