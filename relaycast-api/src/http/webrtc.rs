//! WebRTC configuration endpoint
//!
//! `GET /api/webrtc/ice-servers` hands browsers the STUN servers the
//! server-side peer connections use.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

use crate::http::AppState;

/// ICE server in the browser `RTCIceServer` shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// URLs for the ICE server (e.g., ["stun:stun.example.com:3478"])
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetIceServersResponse {
    pub servers: Vec<IceServerConfig>,
}

pub async fn get_ice_servers(State(state): State<AppState>) -> Json<GetIceServersResponse> {
    let stun_servers = &state.hub.webrtc_config().stun_servers;
    let servers = if stun_servers.is_empty() {
        Vec::new()
    } else {
        vec![IceServerConfig {
            urls: stun_servers.clone(),
        }]
    };

    Json(GetIceServersResponse { servers })
}
