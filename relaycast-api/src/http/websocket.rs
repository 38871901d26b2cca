//! WebSocket control channel
//!
//! One socket per client. The client identifier arrives as a query
//! parameter; connections without one, or with an id already in use, are
//! closed with 1008 before any message is exchanged.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use relaycast_core::Error;
use relaycast_signal::SignalEnvelope;

use crate::http::AppState;

/// Upgrade handler for `GET /ws?clientId=<id>`
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let raw_id = params.get(&state.signaling.client_id_param).cloned();

    // Signaling messages are small; the axum default of 64MB is excessive
    ws.max_message_size(state.signaling.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, raw_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, raw_id: Option<String>) {
    let (client, mut outbound) = match state.hub.connect(raw_id.as_deref()) {
        Ok(admitted) => admitted,
        Err(e) => {
            reject(socket, &e).await;
            return;
        }
    };
    let id = client.id.clone();
    info!(client_id = %id, "WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound queue -> socket
    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!(client_id = %writer_id, error = %e, "Failed to encode message");
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                debug!(client_id = %writer_id, error = %e, "Failed to send WebSocket message");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match SignalEnvelope::from_json(text.as_str()) {
                Ok(envelope) => state.hub.dispatch(&id, envelope).await,
                Err(e) => debug!(client_id = %id, error = %e, "Skipping unparseable message"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                // Binary, ping and pong frames carry no signaling
            }
            Err(e) => {
                debug!(client_id = %id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    state.hub.on_disconnect(&id).await;
    writer.abort();

    info!(client_id = %id, "WebSocket connection closed");
}

async fn reject(mut socket: WebSocket, error: &Error) {
    let reason = match error {
        Error::DuplicateClient(_) => "duplicate client id",
        _ => "missing client id",
    };
    warn!(error = %error, "Rejecting WebSocket connection");

    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
    }
}
