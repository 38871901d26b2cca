pub mod id;
pub mod media;

pub use id::ClientId;
pub use media::{MediaPacket, TrackKind};
