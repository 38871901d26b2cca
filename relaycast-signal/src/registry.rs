//! Connection registry
//!
//! Owns every connected `Client`. Insertion order is kept so "first two
//! active sessions" has a stable meaning: registration order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use relaycast_core::models::{ClientId, TrackKind};
use relaycast_core::{Error, Result};

use crate::channel::ClientChannel;
use crate::session::Session;
use crate::sink::MediaSink;
use crate::transcode::{JobInfo, TranscodeJob};

/// One connected client and everything it owns
pub struct Client {
    pub id: ClientId,
    pub channel: ClientChannel,
    /// Registration sequence number
    pub seq: u64,
    pub connected_at: Instant,

    session: RwLock<Option<Arc<Session>>>,
    /// Serializes offer handling for this client
    pub(crate) negotiation: tokio::sync::Mutex<()>,
    sinks: tokio::sync::Mutex<HashMap<TrackKind, Arc<dyn MediaSink>>>,
    job: Mutex<Option<TranscodeJob>>,
    video_seen: AtomicBool,
    closing: AtomicBool,
}

impl Client {
    fn new(id: ClientId, channel: ClientChannel, seq: u64) -> Self {
        Self {
            id,
            channel,
            seq,
            connected_at: Instant::now(),
            session: RwLock::new(None),
            negotiation: tokio::sync::Mutex::new(()),
            sinks: tokio::sync::Mutex::new(HashMap::new()),
            job: Mutex::new(None),
            video_seen: AtomicBool::new(false),
            closing: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    #[must_use]
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    pub(crate) fn set_session(&self, session: Arc<Session>) {
        *self.session.write() = Some(session);
    }

    pub(crate) fn take_session(&self) -> Option<Arc<Session>> {
        self.session.write().take()
    }

    /// Clear the session slot only if it still holds `session`
    pub(crate) fn clear_session_if(&self, session: &Arc<Session>) -> bool {
        let mut slot = self.session.write();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, session)) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn owns_session(&self, session: &Arc<Session>) -> bool {
        self.session
            .read()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }

    /// Whether this client has a negotiated server-mediated session
    #[must_use]
    pub fn has_active_session(&self) -> bool {
        self.session.read().as_ref().is_some_and(|s| s.is_active())
    }

    #[must_use]
    pub fn has_job(&self) -> bool {
        self.job.lock().is_some()
    }

    #[must_use]
    pub fn job_info(&self) -> Option<JobInfo> {
        self.job.lock().as_ref().map(TranscodeJob::info)
    }

    pub(crate) fn set_job(&self, job: TranscodeJob) {
        *self.job.lock() = Some(job);
    }

    pub(crate) fn take_job(&self) -> Option<TranscodeJob> {
        self.job.lock().take()
    }

    /// Clear the job slot if it still holds job `job_id`
    pub(crate) fn clear_job_if(&self, job_id: u64) -> Option<TranscodeJob> {
        let mut slot = self.job.lock();
        if slot.as_ref().is_some_and(|job| job.id == job_id) {
            slot.take()
        } else {
            None
        }
    }

    /// Record the first video track; returns true only the first time
    pub(crate) fn mark_video_seen(&self) -> bool {
        !self.video_seen.swap(true, Ordering::AcqRel)
    }

    /// Start teardown; returns false if teardown already began
    pub(crate) fn begin_teardown(&self) -> bool {
        !self.closing.swap(true, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Return the sink for `kind`, opening it with `open` on first use
    ///
    /// `None` once teardown has begun; no new sink is opened then.
    pub(crate) async fn sink_or_open<F, Fut>(
        &self,
        kind: TrackKind,
        open: F,
    ) -> Result<Option<Arc<dyn MediaSink>>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Arc<dyn MediaSink>>>,
    {
        let mut sinks = self.sinks.lock().await;
        if self.is_closing() {
            return Ok(None);
        }
        if let Some(sink) = sinks.get(&kind) {
            return Ok(Some(sink.clone()));
        }
        let sink = open().await?;
        sinks.insert(kind, sink.clone());
        Ok(Some(sink))
    }

    pub(crate) async fn take_sinks(&self) -> Vec<(TrackKind, Arc<dyn MediaSink>)> {
        self.sinks.lock().await.drain().collect()
    }

    pub async fn sink_count(&self) -> usize {
        self.sinks.lock().await.len()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("seq", &self.seq)
            .field("open", &self.channel.is_open())
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

/// Registry of connected clients
///
/// Add, remove and broadcast iteration are mutually exclusive through one
/// `RwLock`; broadcasts hold the read side for the whole iteration.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<IndexMap<ClientId, Arc<Client>>>,
    next_seq: AtomicU64,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client
    ///
    /// A second connection with an id already present is rejected; the
    /// existing client keeps its resources.
    pub fn register(&self, id: ClientId, channel: ClientChannel) -> Result<Arc<Client>> {
        let mut clients = self.clients.write();
        if clients.contains_key(&id) {
            debug!(client_id = %id, "Rejecting duplicate client id");
            return Err(Error::DuplicateClient(id.to_string()));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(Client::new(id.clone(), channel, seq));
        clients.insert(id.clone(), client.clone());

        info!(client_id = %id, seq, total = clients.len(), "Client registered");
        Ok(client)
    }

    #[must_use]
    pub fn lookup(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.clients.read().get(id).cloned()
    }

    /// Remove a client, keeping the order of the others
    pub fn remove(&self, id: &ClientId) -> Option<Arc<Client>> {
        let mut clients = self.clients.write();
        let removed = clients.shift_remove(id);
        if removed.is_some() {
            info!(client_id = %id, total = clients.len(), "Client removed");
        }
        removed
    }

    /// Call `f` for every client except `exclude`, in registration order
    pub fn for_each_other<F>(&self, exclude: &ClientId, mut f: F)
    where
        F: FnMut(&Arc<Client>),
    {
        let clients = self.clients.read();
        for (id, client) in clients.iter() {
            if id != exclude {
                f(client);
            }
        }
    }

    /// Snapshot of all clients in registration order
    #[must_use]
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.clients.read().values().cloned().collect()
    }

    /// Clients with a negotiated session, in registration order
    #[must_use]
    pub fn with_active_session(&self) -> Vec<Arc<Client>> {
        self.clients
            .read()
            .values()
            .filter(|client| !client.is_closing() && client.has_active_session())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
