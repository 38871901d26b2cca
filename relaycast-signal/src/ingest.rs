//! Media ingest
//!
//! Each inbound track gets a pump task that appends packets to the
//! client's sink for that kind. The first video track also arms a one-shot
//! warm-up timer that asks the orchestrator to start encoding.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use relaycast_core::config::MediaConfig;
use relaycast_core::models::{ClientId, TrackKind};
use relaycast_core::Result;

use crate::registry::Client;
use crate::sink::{MediaLayout, MediaSink, RawSink, VideoCapture};
use crate::transcode::TranscodeOrchestrator;
use crate::transport::InboundTrack;

pub struct MediaIngest {
    layout: MediaLayout,
    timestamped_types: Vec<u8>,
    warmup_delay: Duration,
    orchestrator: Arc<TranscodeOrchestrator>,
}

impl MediaIngest {
    pub fn new(config: &MediaConfig, orchestrator: Arc<TranscodeOrchestrator>) -> Self {
        Self {
            layout: MediaLayout::new(&config.capture_dir),
            timestamped_types: config.timestamped_payload_types.clone(),
            warmup_delay: config.warmup_delay(),
            orchestrator,
        }
    }

    /// Route a newly available track into the client's sink for its kind
    pub async fn on_track(&self, client: &Arc<Client>, mut track: Box<dyn InboundTrack>) {
        let kind = track.kind();
        let track_id = track.id();

        let sink = match client
            .sink_or_open(kind, || self.open_sink(&client.id, kind))
            .await
        {
            Ok(Some(sink)) => sink,
            Ok(None) => {
                debug!(client_id = %client.id, %kind, "Client disconnecting, ignoring track");
                return;
            }
            Err(e) => {
                error!(client_id = %client.id, %kind, error = %e, "Failed to open media sink");
                return;
            }
        };
        info!(client_id = %client.id, %kind, track_id = %track_id, "Ingesting track");

        if kind == TrackKind::Video && client.mark_video_seen() {
            self.schedule_transcode(client.id.clone());
        }

        let client_id = client.id.clone();
        tokio::spawn(async move {
            let mut packets = 0u64;
            while let Some(packet) = track.next_packet().await {
                if sink.is_finished() {
                    break;
                }
                if let Err(e) = sink.write_packet(&packet).await {
                    warn!(client_id = %client_id, %kind, error = %e, "Dropped media packet");
                    continue;
                }
                packets += 1;
            }
            debug!(client_id = %client_id, %kind, track_id = %track_id, packets, "Track pump stopped");
        });
    }

    async fn open_sink(&self, client: &ClientId, kind: TrackKind) -> Result<Arc<dyn MediaSink>> {
        Ok(match kind {
            TrackKind::Video => Arc::new(
                VideoCapture::create(&self.layout, client, self.timestamped_types.clone()).await?,
            ),
            TrackKind::Audio => Arc::new(RawSink::create(self.layout.audio(client)).await?),
        })
    }

    fn schedule_transcode(&self, client: ClientId) {
        let orchestrator = self.orchestrator.clone();
        let delay = self.warmup_delay;
        debug!(client_id = %client, delay_ms = delay.as_millis(), "Transcode warm-up armed");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match orchestrator.start_processing_for(&client).await {
                Ok(Some(plan)) => debug!(client_id = %client, plan = %plan, "Warm-up transcode started"),
                Ok(None) => debug!(client_id = %client, "Warm-up transcode skipped"),
                Err(e) => error!(client_id = %client, error = %e, "Failed to start transcode"),
            }
        });
    }
}
