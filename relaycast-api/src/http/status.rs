//! Hub status endpoints
//!
//! - `GET /api/status` - connected clients, sessions and the output job
//! - `GET /api/clients/{client_id}` - one client's negotiation and capture state

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;

use relaycast_core::models::ClientId;
use relaycast_signal::{HubStats, SessionState};

use crate::http::{AppError, AppResult, AppState};

pub async fn get_status(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats().await)
}

#[derive(Debug, Serialize)]
pub struct ClientStatus {
    pub client_id: ClientId,
    pub session: &'static str,
    pub open_sinks: usize,
    pub transcoding: bool,
    pub connected_secs: u64,
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> AppResult<Json<ClientStatus>> {
    let id = ClientId::parse(&client_id).ok_or_else(|| AppError::bad_request("Blank client id"))?;
    let client = state
        .hub
        .registry()
        .lookup(&id)
        .ok_or_else(|| AppError::not_found(format!("Client {id} not connected")))?;

    let session = client
        .session()
        .map_or(SessionState::Idle, |session| session.state());

    Ok(Json(ClientStatus {
        client_id: id,
        session: session.as_str(),
        open_sinks: client.sink_count().await,
        transcoding: client.has_job(),
        connected_secs: client.duration().as_secs(),
    }))
}
