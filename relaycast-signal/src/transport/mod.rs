//! Peer transport seam
//!
//! The session manager drives negotiation through `PeerTransport` and
//! receives asynchronous transport activity as `TransportEvent`s on a
//! channel. `rtc` holds the webrtc-rs implementation.

mod rtc;

pub use rtc::WebRtcTransportFactory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use relaycast_core::models::{ClientId, MediaPacket, TrackKind};
use relaycast_core::Result;

use crate::protocol::IceCandidate;

/// Inbound media track surfaced by a negotiated transport
#[async_trait]
pub trait InboundTrack: Send {
    fn kind(&self) -> TrackKind;

    fn id(&self) -> String;

    /// Next packet in transport delivery order; `None` once the track ends
    async fn next_packet(&mut self) -> Option<MediaPacket>;
}

/// Asynchronous activity reported by a transport
pub enum TransportEvent {
    /// A local candidate was gathered and should be sent to the client
    LocalCandidate(IceCandidate),
    /// A remote media track became available
    Track(Box<dyn InboundTrack>),
    /// The connection failed or closed
    Closed,
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalCandidate(c) => f.debug_tuple("LocalCandidate").field(c).finish(),
            Self::Track(t) => f.debug_tuple("Track").field(&t.kind()).finish(),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// Server-terminated media transport for one client
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Apply the remote offer, then create and apply the local answer
    ///
    /// Returns the answer SDP.
    async fn accept_offer(&self, offer_sdp: &str) -> Result<String>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        client_id: &ClientId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>>;
}
