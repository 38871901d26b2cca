//! Signal hub
//!
//! Owns the registry and wires the dispatcher, session manager, ingest,
//! orchestrator and lifecycle controller together. The HTTP layer only
//! talks to this type.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use relaycast_core::config::WebRTCConfig;
use relaycast_core::models::ClientId;
use relaycast_core::{Config, Error, Result};

use crate::channel::ClientChannel;
use crate::dispatcher::SignalDispatcher;
use crate::ingest::MediaIngest;
use crate::lifecycle::LifecycleController;
use crate::protocol::SignalEnvelope;
use crate::registry::{Client, ClientRegistry};
use crate::session::{SessionManager, SessionState};
use crate::sink::MediaLayout;
use crate::transcode::{EncoderLauncher, FfmpegLauncher, TranscodeOrchestrator, TranscodePlan};
use crate::transport::{TransportFactory, WebRtcTransportFactory};

/// Point-in-time view of the hub
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub clients: usize,
    pub active_sessions: usize,
    pub open_sinks: usize,
    pub output: Option<OutputStats>,
    pub playlist: String,
}

/// The job currently writing the published playlist
#[derive(Debug, Clone, Serialize)]
pub struct OutputStats {
    pub owner: ClientId,
    pub job_id: u64,
    pub plan: TranscodePlan,
    pub pid: Option<u32>,
}

pub struct SignalHub {
    registry: Arc<ClientRegistry>,
    dispatcher: SignalDispatcher,
    sessions: Arc<SessionManager>,
    orchestrator: Arc<TranscodeOrchestrator>,
    lifecycle: LifecycleController,
    webrtc: WebRTCConfig,
    outbound_buffer: usize,
}

impl SignalHub {
    pub fn new(
        config: &Config,
        factory: Arc<dyn TransportFactory>,
        launcher: Arc<dyn EncoderLauncher>,
    ) -> Arc<Self> {
        let registry = Arc::new(ClientRegistry::new());
        let orchestrator = Arc::new(TranscodeOrchestrator::new(
            registry.clone(),
            launcher,
            config.transcode.clone(),
            MediaLayout::new(&config.media.capture_dir),
        ));
        let ingest = Arc::new(MediaIngest::new(&config.media, orchestrator.clone()));
        let sessions = Arc::new(SessionManager::new(registry.clone(), factory, ingest));

        Arc::new(Self {
            dispatcher: SignalDispatcher::new(registry.clone(), sessions.clone()),
            lifecycle: LifecycleController::new(registry.clone()),
            registry,
            sessions,
            orchestrator,
            webrtc: config.webrtc.clone(),
            outbound_buffer: config.signaling.outbound_buffer,
        })
    }

    /// Hub backed by webrtc-rs and the configured ffmpeg binary
    pub fn from_config(config: &Config) -> Arc<Self> {
        Self::new(
            config,
            Arc::new(WebRtcTransportFactory::new(&config.webrtc)),
            Arc::new(FfmpegLauncher::new(&config.transcode.ffmpeg_path)),
        )
    }

    /// Admit a new control channel
    ///
    /// A missing or blank id is `ConnectionRejected`; an id already in use is
    /// `DuplicateClient`. Returns the client and the receiving half of its
    /// outbound queue.
    pub fn connect(
        &self,
        raw_id: Option<&str>,
    ) -> Result<(Arc<Client>, tokio::sync::mpsc::Receiver<SignalEnvelope>)> {
        let id = raw_id
            .and_then(ClientId::parse)
            .ok_or_else(|| Error::ConnectionRejected("missing client id".to_string()))?;

        let (channel, receiver) = ClientChannel::new(self.outbound_buffer);
        let client = self.registry.register(id, channel)?;
        Ok((client, receiver))
    }

    pub async fn dispatch(&self, from: &ClientId, message: SignalEnvelope) {
        self.dispatcher.dispatch(from, message).await;
    }

    pub async fn on_disconnect(&self, id: &ClientId) -> bool {
        self.lifecycle.on_disconnect(id).await
    }

    /// Tear down every remaining client
    pub async fn shutdown(&self) {
        let clients = self.registry.clients();
        info!(clients = clients.len(), "Shutting down signal hub");
        for client in clients {
            self.lifecycle.on_disconnect(&client.id).await;
        }
    }

    pub async fn stats(&self) -> HubStats {
        let clients = self.registry.clients();
        let mut open_sinks = 0;
        for client in &clients {
            open_sinks += client.sink_count().await;
        }

        HubStats {
            clients: clients.len(),
            active_sessions: self.registry.with_active_session().len(),
            open_sinks,
            output: self.orchestrator.current_job().map(|(owner, job)| OutputStats {
                owner,
                job_id: job.id,
                plan: job.plan,
                pid: job.pid,
            }),
            playlist: self.orchestrator.config().playlist_path().display().to_string(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<TranscodeOrchestrator> {
        &self.orchestrator
    }

    #[must_use]
    pub const fn webrtc_config(&self) -> &WebRTCConfig {
        &self.webrtc
    }

    /// Session state for `id`, `Idle` when it never offered
    #[must_use]
    pub fn session_state(&self, id: &ClientId) -> Option<SessionState> {
        let client = self.registry.lookup(id)?;
        Some(client.session().map_or(SessionState::Idle, |s| s.state()))
    }
}
