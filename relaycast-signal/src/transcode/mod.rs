//! Transcode orchestration
//!
//! Picks a single or composite plan once media is flowing and keeps at most
//! one encoder writing the published playlist.

mod job;
mod plan;
mod process;

pub use job::{JobInfo, TranscodeJob};
pub use plan::TranscodePlan;
pub use process::{EncoderLauncher, EncoderProcess, FfmpegLauncher, ProcessExit};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use relaycast_core::config::TranscodeConfig;
use relaycast_core::models::ClientId;
use relaycast_core::Result;

use crate::registry::{Client, ClientRegistry};
use crate::sink::MediaLayout;

pub struct TranscodeOrchestrator {
    registry: Arc<ClientRegistry>,
    launcher: Arc<dyn EncoderLauncher>,
    config: TranscodeConfig,
    layout: MediaLayout,
    /// Serializes plan selection, supersession and launch
    start_lock: tokio::sync::Mutex<()>,
    next_job_id: AtomicU64,
}

impl TranscodeOrchestrator {
    pub fn new(
        registry: Arc<ClientRegistry>,
        launcher: Arc<dyn EncoderLauncher>,
        config: TranscodeConfig,
        layout: MediaLayout,
    ) -> Self {
        Self {
            registry,
            launcher,
            config,
            layout,
            start_lock: tokio::sync::Mutex::new(()),
            next_job_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// Start the encoder on behalf of `id`
    ///
    /// No-op (`Ok(None)`) when the client is gone, disconnecting, already
    /// owns a job, or the selected plan is the one already publishing.
    /// With two or more active sessions the first two in registration order
    /// are composited; otherwise `id` is encoded alone.
    /// Any job owned by another client is stopped first so only one encoder
    /// writes the playlist.
    pub async fn start_processing_for(&self, id: &ClientId) -> Result<Option<TranscodePlan>> {
        let _starting = self.start_lock.lock().await;

        let Some(client) = self.registry.lookup(id) else {
            debug!(client_id = %id, "Client gone before transcode start");
            return Ok(None);
        };
        if client.is_closing() {
            return Ok(None);
        }
        if client.has_job() {
            debug!(client_id = %id, "Transcode already running for client");
            return Ok(None);
        }

        let plan = self.select_plan(id);
        if let Some((owner, current)) = self.current_job() {
            if current.plan == plan {
                debug!(client_id = %id, owner = %owner, plan = %plan, "Selected plan already publishing");
                return Ok(None);
            }
        }
        self.stop_other_jobs(id).await;

        let args = plan.args(&self.config, &self.layout);
        debug!(client_id = %id, args = ?args, "Launching encoder");
        let process = self.launcher.launch(&args).await?;

        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let (job, gate) = TranscodeJob::spawn(
            job_id,
            plan.clone(),
            process,
            self.config.terminate_grace(),
            Arc::downgrade(&client),
        );
        info!(
            client_id = %id,
            job_id,
            plan = %plan,
            pid = ?job.pid,
            output = %self.config.playlist_path().display(),
            "Transcode started"
        );
        client.set_job(job);
        gate.open();

        // Teardown may have taken the slot before the job was stored
        if client.is_closing() {
            if let Some(job) = client.take_job() {
                job.terminate().await;
            }
        }

        Ok(Some(plan))
    }

    fn select_plan(&self, id: &ClientId) -> TranscodePlan {
        match self.registry.with_active_session().as_slice() {
            [first, second, ..] => TranscodePlan::Composite {
                primary: first.id.clone(),
                secondary: second.id.clone(),
            },
            _ => TranscodePlan::Single { client: id.clone() },
        }
    }

    async fn stop_other_jobs(&self, id: &ClientId) {
        for other in self.registry.clients() {
            if other.id == *id {
                continue;
            }
            if let Some(job) = other.take_job() {
                info!(client_id = %other.id, job_id = job.id, plan = %job.plan, "Superseding running transcode");
                job.terminate().await;
            }
        }
    }

    /// Job currently writing the published output and its owner
    #[must_use]
    pub fn current_job(&self) -> Option<(ClientId, JobInfo)> {
        self.registry
            .clients()
            .iter()
            .find_map(|client: &Arc<Client>| client.job_info().map(|info| (client.id.clone(), info)))
    }
}
