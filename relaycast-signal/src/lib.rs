//! Signaling and session core
//!
//! Accepts client control channels, routes signaling messages, terminates
//! server-mediated WebRTC sessions, captures inbound media to per-client
//! files and drives the external encoder that publishes the HLS output.

pub mod channel;
pub mod dispatcher;
pub mod hub;
pub mod ingest;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod sink;
pub mod transcode;
pub mod transport;

pub use channel::{ChannelError, ClientChannel};
pub use hub::{HubStats, OutputStats, SignalHub};
pub use protocol::{IceCandidate, MessageKind, SignalEnvelope};
pub use registry::{Client, ClientRegistry};
pub use session::{Session, SessionManager, SessionState};
