use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound RTP packet, reduced to what the capture sinks need
#[derive(Debug, Clone)]
pub struct MediaPacket {
    pub payload_type: u8,
    /// RTP timestamp in the track's clock rate
    pub timestamp: u32,
    pub payload: Bytes,
}

impl MediaPacket {
    pub fn new(payload_type: u8, timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            payload_type,
            timestamp,
            payload: payload.into(),
        }
    }
}
