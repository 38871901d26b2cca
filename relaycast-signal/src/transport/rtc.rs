//! webrtc-rs backed transport

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_remote::TrackRemote;

use relaycast_core::config::WebRTCConfig;
use relaycast_core::models::{ClientId, MediaPacket, TrackKind};
use relaycast_core::{Error, Result};

use super::{InboundTrack, PeerTransport, TransportEvent, TransportFactory};
use crate::protocol::IceCandidate;

/// Builds one receive-only `RTCPeerConnection` per client
pub struct WebRtcTransportFactory {
    rtc_config: RTCConfiguration,
}

impl WebRtcTransportFactory {
    #[must_use]
    pub fn new(config: &WebRTCConfig) -> Self {
        let ice_servers = if config.stun_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: config.stun_servers.clone(),
                ..Default::default()
            }]
        };

        Self {
            rtc_config: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        client_id: &ClientId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::negotiation(client_id.as_str(), e))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| Error::negotiation(client_id.as_str(), e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = Arc::new(
            api.new_peer_connection(self.rtc_config.clone())
                .await
                .map_err(|e| Error::negotiation(client_id.as_str(), e))?,
        );

        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            peer_connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(|e| Error::negotiation(client_id.as_str(), e))?;
        }

        register_callbacks(&peer_connection, client_id, events);

        Ok(Arc::new(WebRtcTransport {
            client_id: client_id.clone(),
            peer_connection,
        }))
    }
}

// Callbacks only forward into the event channel; webrtc-rs holds a lock
// on the handler while the returned future runs.
fn register_callbacks(
    peer_connection: &Arc<RTCPeerConnection>,
    client_id: &ClientId,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let tx = events.clone();
    let id = client_id.clone();
    peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let tx = tx.clone();
        let id = id.clone();
        Box::pin(async move {
            let Some(candidate) = candidate else {
                debug!(client_id = %id, "Local candidate gathering complete");
                return;
            };
            match candidate.to_json() {
                Ok(init) => {
                    let _ = tx.send(TransportEvent::LocalCandidate(from_init(init)));
                }
                Err(e) => warn!(client_id = %id, error = %e, "Failed to serialize local candidate"),
            }
        })
    }));

    let tx = events.clone();
    let id = client_id.clone();
    peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
        let tx = tx.clone();
        let id = id.clone();
        Box::pin(async move {
            info!(client_id = %id, kind = %track.kind(), ssrc = track.ssrc(), "Remote track added");
            let _ = tx.send(TransportEvent::Track(Box::new(RemoteTrack { track })));
        })
    }));

    let tx = events;
    let id = client_id.clone();
    peer_connection.on_peer_connection_state_change(Box::new(
        move |state: RTCPeerConnectionState| {
            let tx = tx.clone();
            let id = id.clone();
            Box::pin(async move {
                debug!(client_id = %id, state = %state, "Peer connection state changed");
                if matches!(
                    state,
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
                ) {
                    let _ = tx.send(TransportEvent::Closed);
                }
            })
        },
    ));
}

struct WebRtcTransport {
    client_id: ClientId,
    peer_connection: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn accept_offer(&self, offer_sdp: &str) -> Result<String> {
        let id = self.client_id.as_str();

        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| Error::negotiation(id, format!("invalid offer: {e}")))?;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::negotiation(id, format!("set remote description: {e}")))?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::negotiation(id, format!("create answer: {e}")))?;

        self.peer_connection
            .set_local_description(answer.clone())
            .await
            .map_err(|e| Error::negotiation(id, format!("set local description: {e}")))?;

        Ok(self
            .peer_connection
            .local_description()
            .await
            .map_or(answer.sdp, |description| description.sdp))
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(to_init(candidate))
            .await
            .map_err(|e| Error::candidate(self.client_id.as_str(), e))
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::Internal(format!("close peer connection {}: {e}", self.client_id)))
    }
}

struct RemoteTrack {
    track: Arc<TrackRemote>,
}

#[async_trait]
impl InboundTrack for RemoteTrack {
    fn kind(&self) -> TrackKind {
        match self.track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        }
    }

    fn id(&self) -> String {
        self.track.id()
    }

    async fn next_packet(&mut self) -> Option<MediaPacket> {
        match self.track.read_rtp().await {
            Ok((packet, _attributes)) => Some(MediaPacket {
                payload_type: packet.header.payload_type,
                timestamp: packet.header.timestamp,
                payload: packet.payload,
            }),
            Err(e) => {
                debug!(track_id = %self.track.id(), error = %e, "Track read ended");
                None
            }
        }
    }
}

fn to_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

fn from_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}
