use std::sync::Weak;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use relaycast_core::Error;

use super::plan::TranscodePlan;
use super::process::{EncoderProcess, ProcessExit};
use crate::registry::Client;

/// Snapshot of a running job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub id: u64,
    pub plan: TranscodePlan,
    pub pid: Option<u32>,
}

/// Handle to one running encoder and its supervisor task
///
/// Dropping the handle stops the encoder.
pub struct TranscodeJob {
    pub id: u64,
    pub plan: TranscodePlan,
    pub pid: Option<u32>,
    stop_tx: Option<oneshot::Sender<()>>,
    supervisor: JoinHandle<()>,
}

/// Holds the supervisor back until the job handle is stored
///
/// The supervisor clears the owner's slot when the encoder exits, so it
/// must not observe an exit before the slot holds the handle. Dropping the
/// gate releases the supervisor as well.
pub(crate) struct JobGate(oneshot::Sender<()>);

impl JobGate {
    pub(crate) fn open(self) {
        let _ = self.0.send(());
    }
}

enum Outcome {
    Exited(relaycast_core::Result<ProcessExit>),
    Stop,
}

impl TranscodeJob {
    /// Supervise `process`. When it exits on its own the owner's job slot is
    /// cleared; nothing restarts it.
    ///
    /// Supervision starts once the returned gate is opened or dropped.
    pub(crate) fn spawn(
        id: u64,
        plan: TranscodePlan,
        mut process: Box<dyn EncoderProcess>,
        grace: Duration,
        owner: Weak<Client>,
    ) -> (Self, JobGate) {
        let pid = process.pid();
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let (gate_tx, gate_rx) = oneshot::channel();
        let label = plan.to_string();

        let supervisor = tokio::spawn(async move {
            let _ = gate_rx.await;

            let outcome = tokio::select! {
                result = process.wait() => Outcome::Exited(result),
                _ = &mut stop_rx => Outcome::Stop,
            };

            match outcome {
                Outcome::Exited(result) => {
                    match result {
                        Ok(exit) if exit.success => info!(job_id = id, plan = %label, "Encoder finished"),
                        Ok(exit) => {
                            let fault = Error::SubprocessFault(format!("exited with code {:?}", exit.code));
                            error!(job_id = id, plan = %label, error = %fault, "Encoder exited");
                        }
                        Err(e) => error!(job_id = id, plan = %label, error = %e, "Encoder wait failed"),
                    }
                    if let Some(client) = owner.upgrade() {
                        // Detach our own handle; dropping it here is a no-op
                        drop(client.clear_job_if(id));
                    }
                }
                Outcome::Stop => match process.terminate(grace).await {
                    Ok(exit) => info!(job_id = id, plan = %label, code = ?exit.code, "Encoder stopped"),
                    Err(e) => warn!(job_id = id, plan = %label, error = %e, "Failed to stop encoder"),
                },
            }
        });

        let job = Self {
            id,
            plan,
            pid,
            stop_tx: Some(stop_tx),
            supervisor,
        };
        (job, JobGate(gate_tx))
    }

    #[must_use]
    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            plan: self.plan.clone(),
            pid: self.pid,
        }
    }

    /// Stop the encoder and wait until it is gone
    pub async fn terminate(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Err(e) = (&mut self.supervisor).await {
            warn!(job_id = self.id, error = %e, "Encoder supervisor panicked");
        }
    }
}

impl std::fmt::Debug for TranscodeJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeJob")
            .field("id", &self.id)
            .field("plan", &self.plan)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}
