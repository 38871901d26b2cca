//! Disconnect teardown

use std::sync::Arc;

use tracing::{debug, info, warn};

use relaycast_core::models::ClientId;

use crate::protocol::SignalEnvelope;
use crate::registry::ClientRegistry;

pub struct LifecycleController {
    registry: Arc<ClientRegistry>,
}

impl LifecycleController {
    pub const fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Release everything `id` owns and tell the others it left
    ///
    /// Order: session, sinks, encoder, registry entry, broadcast. Fields the
    /// client never populated are skipped. Returns false when the client is
    /// unknown or already being torn down.
    pub async fn on_disconnect(&self, id: &ClientId) -> bool {
        let Some(client) = self.registry.lookup(id) else {
            debug!(client_id = %id, "Disconnect for unknown client");
            return false;
        };
        if !client.begin_teardown() {
            debug!(client_id = %id, "Teardown already in progress");
            return false;
        }
        client.channel.close();

        if let Some(session) = client.take_session() {
            session.close().await;
        }

        for (kind, sink) in client.take_sinks().await {
            let stats = sink.stats();
            if let Err(e) = sink.finish().await {
                warn!(client_id = %id, %kind, error = %e, "Failed to finish media sink");
            }
            debug!(
                client_id = %id,
                %kind,
                packets = stats.packets_written,
                bytes = stats.bytes_written,
                "Media sink closed"
            );
        }

        if let Some(job) = client.take_job() {
            info!(client_id = %id, job_id = job.id, plan = %job.plan, "Stopping transcode");
            job.terminate().await;
        }

        self.registry.remove(id);

        let notice = SignalEnvelope::peer_disconnected(id);
        let mut notified = 0usize;
        self.registry.for_each_other(id, |other| {
            if other.channel.send(notice.clone()).is_ok() {
                notified += 1;
            }
        });

        info!(
            client_id = %id,
            notified,
            connected_for = ?client.duration(),
            "Client disconnected"
        );
        true
    }
}
