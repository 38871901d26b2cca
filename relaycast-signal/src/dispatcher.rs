//! Signaling dispatcher
//!
//! Routes each inbound envelope by `type`: discovery broadcast,
//! server-mediated negotiation, or direct relay to another client.
//! Per-client faults are logged here and never propagate further.

use std::sync::Arc;

use tracing::{debug, warn};

use relaycast_core::models::ClientId;
use relaycast_core::{Error, Result};

use crate::protocol::{MessageKind, SignalEnvelope};
use crate::registry::ClientRegistry;
use crate::session::SessionManager;

pub struct SignalDispatcher {
    registry: Arc<ClientRegistry>,
    sessions: Arc<SessionManager>,
}

impl SignalDispatcher {
    pub const fn new(registry: Arc<ClientRegistry>, sessions: Arc<SessionManager>) -> Self {
        Self { registry, sessions }
    }

    pub async fn dispatch(&self, from: &ClientId, message: SignalEnvelope) {
        let kind = message.message_kind();

        let result = match &kind {
            MessageKind::InitiateDiscovery => {
                self.broadcast_discovery(from);
                Ok(())
            }
            MessageKind::Offer => self.offer(from, &message).await,
            MessageKind::Candidate => self.candidate(from, &message).await,
            kind if kind.is_direct() => self.relay(from, message),
            other => {
                debug!(client_id = %from, kind = %other.as_str(), "Ignoring message");
                Ok(())
            }
        };

        match result {
            Ok(()) => {}
            Err(e @ Error::RelayDropped(_)) => {
                debug!(client_id = %from, kind = %kind.as_str(), error = %e, "Relay dropped");
            }
            Err(e) => warn!(client_id = %from, kind = %kind.as_str(), error = %e, "Signaling error"),
        }
    }

    /// Announce `from` to every other client with an open channel
    fn broadcast_discovery(&self, from: &ClientId) {
        let notice = SignalEnvelope::discovery(from);
        let mut delivered = 0usize;

        self.registry.for_each_other(from, |client| {
            if !client.channel.is_open() {
                return;
            }
            match client.channel.send(notice.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(client_id = %client.id, error = %e, "Discovery not delivered"),
            }
        });

        debug!(client_id = %from, delivered, "Discovery broadcast");
    }

    async fn offer(&self, from: &ClientId, message: &SignalEnvelope) -> Result<()> {
        let sdp = message
            .sdp()
            .ok_or_else(|| Error::negotiation(from.as_str(), "offer without sdp"))?;
        self.sessions.handle_offer(from, sdp).await
    }

    async fn candidate(&self, from: &ClientId, message: &SignalEnvelope) -> Result<()> {
        let candidate = message
            .candidate()
            .ok_or_else(|| Error::candidate(from.as_str(), "message without candidate"))?;
        self.sessions.handle_candidate(from, candidate).await
    }

    /// Forward a direct-* message to `toPeerID` with `fromPeerID` stamped
    fn relay(&self, from: &ClientId, mut message: SignalEnvelope) -> Result<()> {
        let target = message
            .to_peer_id
            .as_deref()
            .and_then(ClientId::parse)
            .ok_or_else(|| Error::RelayDropped("<missing toPeerID>".to_string()))?;

        let client = self
            .registry
            .lookup(&target)
            .filter(|client| client.channel.is_open() && !client.is_closing())
            .ok_or_else(|| Error::RelayDropped(target.to_string()))?;

        message.from_peer_id = Some(from.to_string());
        client
            .channel
            .send(message)
            .map_err(|e| Error::RelayDropped(format!("{target}: {e}")))
    }
}
