// Module: http
// WebSocket control channel plus the small JSON and static surfaces around it

pub mod error;
pub mod health;
pub mod status;
pub mod webrtc;
pub mod websocket;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use relaycast_core::config::SignalingConfig;
use relaycast_core::Config;
use relaycast_signal::SignalHub;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SignalHub>,
    pub signaling: SignalingConfig,
    /// Directory holding the published HLS playlist and segments
    pub hls_dir: PathBuf,
}

impl AppState {
    pub fn new(hub: Arc<SignalHub>, config: &Config) -> Self {
        Self {
            hub,
            signaling: config.signaling.clone(),
            hls_dir: PathBuf::from(&config.transcode.output_dir),
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let hls = ServeDir::new(&state.hls_dir);

    let router = Router::new()
        // Control channel
        .route("/ws", get(websocket::websocket_handler))
        // Status
        .route("/api/status", get(status::get_status))
        .route("/api/clients/{client_id}", get(status::get_client))
        .route("/api/webrtc/ice-servers", get(webrtc::get_ice_servers))
        .merge(health::create_health_router())
        // Published output, read-only
        .nest_service("/hls", hls);

    // Apply layers before state
    let router = router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    router.with_state(state)
}
