//! Control channel wire format
//!
//! Every message is a JSON envelope
//! `{ "type": ..., "payload": {...}, "fromPeerID"?: ..., "toPeerID"?: ... }`.
//! Unknown top-level fields are preserved so relayed messages reach the
//! target peer unchanged apart from the stamped `fromPeerID`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use relaycast_core::models::ClientId;

/// Recognized message kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    InitiateDiscovery,
    Discovery,
    Offer,
    Answer,
    Candidate,
    DirectOffer,
    DirectAnswer,
    DirectCandidate,
    PeerDisconnected,
    Unknown(String),
}

impl MessageKind {
    #[must_use]
    pub fn parse(kind: &str) -> Self {
        match kind {
            "initiate-discovery" => Self::InitiateDiscovery,
            "discovery" => Self::Discovery,
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "candidate" => Self::Candidate,
            "direct-offer" => Self::DirectOffer,
            "direct-answer" => Self::DirectAnswer,
            "direct-candidate" => Self::DirectCandidate,
            "peer-disconnected" => Self::PeerDisconnected,
            other => Self::Unknown(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InitiateDiscovery => "initiate-discovery",
            Self::Discovery => "discovery",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::DirectOffer => "direct-offer",
            Self::DirectAnswer => "direct-answer",
            Self::DirectCandidate => "direct-candidate",
            Self::PeerDisconnected => "peer-disconnected",
            Self::Unknown(other) => other,
        }
    }

    /// Kinds forwarded peer-to-peer without server involvement
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        matches!(
            self,
            Self::DirectOffer | Self::DirectAnswer | Self::DirectCandidate
        )
    }
}

/// ICE candidate in the browser's `RTCIceCandidateInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Control channel message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "fromPeerID", default, skip_serializing_if = "Option::is_none")]
    pub from_peer_id: Option<String>,
    #[serde(rename = "toPeerID", default, skip_serializing_if = "Option::is_none")]
    pub to_peer_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SignalEnvelope {
    #[must_use]
    pub fn new(kind: &MessageKind, payload: Value) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            payload,
            from_peer_id: None,
            to_peer_id: None,
            extra: Map::new(),
        }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    #[must_use]
    pub fn message_kind(&self) -> MessageKind {
        MessageKind::parse(&self.kind)
    }

    /// SDP carried in `payload.sdp`
    ///
    /// Accepts either a bare string or a session description object
    /// (`{ "type": "offer", "sdp": "..." }`).
    #[must_use]
    pub fn sdp(&self) -> Option<&str> {
        match self.payload.get("sdp")? {
            Value::String(sdp) => Some(sdp),
            Value::Object(desc) => desc.get("sdp").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Candidate carried in `payload.candidate`, as an object or a bare string
    #[must_use]
    pub fn candidate(&self) -> Option<IceCandidate> {
        match self.payload.get("candidate")? {
            Value::String(candidate) => Some(IceCandidate::new(candidate.clone())),
            value @ Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    /// Server answer to a server-mediated offer
    #[must_use]
    pub fn answer(sdp: &str) -> Self {
        Self::new(&MessageKind::Answer, json!({ "sdp": sdp }))
    }

    /// Server-side ICE candidate for a server-mediated session
    #[must_use]
    pub fn candidate_message(candidate: &IceCandidate) -> Self {
        Self::new(&MessageKind::Candidate, json!({ "candidate": candidate }))
    }

    /// Discovery notification announcing `from` to other clients
    #[must_use]
    pub fn discovery(from: &ClientId) -> Self {
        let mut envelope = Self::new(&MessageKind::Discovery, json!({ "clientId": from }));
        envelope.from_peer_id = Some(from.to_string());
        envelope
    }

    #[must_use]
    pub fn peer_disconnected(id: &ClientId) -> Self {
        Self::new(&MessageKind::PeerDisconnected, json!({ "clientId": id }))
    }
}
