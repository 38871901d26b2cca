//! Server-mediated sessions
//!
//! One negotiation round per client:
//! `Idle -> OfferReceived -> AnswerSent -> CandidatesExchanging -> Closed`.
//! States only move forward.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use relaycast_core::models::ClientId;
use relaycast_core::{Error, Result};

use crate::channel::ClientChannel;
use crate::ingest::MediaIngest;
use crate::protocol::{IceCandidate, SignalEnvelope};
use crate::registry::{Client, ClientRegistry};
use crate::transport::{PeerTransport, TransportEvent, TransportFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Idle,
    OfferReceived,
    AnswerSent,
    CandidatesExchanging,
    Closed,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::OfferReceived => "offer-received",
            Self::AnswerSent => "answer-sent",
            Self::CandidatesExchanging => "candidates-exchanging",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct SessionInner {
    state: SessionState,
    /// Local candidates gathered before the answer went out
    pending_local: Vec<IceCandidate>,
}

/// A server-terminated session for one client
pub struct Session {
    client_id: ClientId,
    channel: ClientChannel,
    transport: Arc<dyn PeerTransport>,
    inner: Mutex<SessionInner>,
    closed: watch::Sender<bool>,
}

impl Session {
    pub fn new(client_id: ClientId, channel: ClientChannel, transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            client_id,
            channel,
            transport,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                pending_local: Vec::new(),
            }),
            closed: watch::Sender::new(false),
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Negotiated and not closed
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            SessionState::AnswerSent | SessionState::CandidatesExchanging
        )
    }

    fn record_offer(&self) {
        let mut inner = self.inner.lock();
        if inner.state < SessionState::OfferReceived {
            inner.state = SessionState::OfferReceived;
        }
    }

    /// Send the answer, then every local candidate gathered so far
    ///
    /// Returns false if the session closed while negotiating.
    fn answer(&self, sdp: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.state >= SessionState::AnswerSent {
            return false;
        }

        if let Err(e) = self.channel.send(SignalEnvelope::answer(sdp)) {
            warn!(client_id = %self.client_id, error = %e, "Failed to queue answer");
        }
        debug!(client_id = %self.client_id, from = %inner.state, "Session state -> answer-sent");
        inner.state = SessionState::AnswerSent;

        for candidate in inner.pending_local.drain(..) {
            if let Err(e) = self.channel.send(SignalEnvelope::candidate_message(&candidate)) {
                debug!(client_id = %self.client_id, error = %e, "Failed to queue local candidate");
            }
        }
        true
    }

    /// Forward a gathered local candidate, holding it until the answer is out
    fn push_local_candidate(&self, candidate: IceCandidate) {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Idle | SessionState::OfferReceived => inner.pending_local.push(candidate),
            SessionState::AnswerSent | SessionState::CandidatesExchanging => {
                if let Err(e) = self.channel.send(SignalEnvelope::candidate_message(&candidate)) {
                    debug!(client_id = %self.client_id, error = %e, "Failed to queue local candidate");
                }
            }
            SessionState::Closed => {}
        }
    }

    fn record_remote_candidate(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::AnswerSent {
            inner.state = SessionState::CandidatesExchanging;
        }
    }

    /// Close the transport; later calls do nothing
    pub async fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Closed {
                return;
            }
            inner.state = SessionState::Closed;
            inner.pending_local.clear();
        }
        self.closed.send_replace(true);

        if let Err(e) = self.transport.close().await {
            warn!(client_id = %self.client_id, error = %e, "Failed to close transport");
        }
        info!(client_id = %self.client_id, "Session closed");
    }

    /// Resolves once `close` has run
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Runs offer/answer and candidate exchange for server-mediated clients
pub struct SessionManager {
    registry: Arc<ClientRegistry>,
    factory: Arc<dyn TransportFactory>,
    ingest: Arc<MediaIngest>,
}

impl SessionManager {
    pub fn new(
        registry: Arc<ClientRegistry>,
        factory: Arc<dyn TransportFactory>,
        ingest: Arc<MediaIngest>,
    ) -> Self {
        Self {
            registry,
            factory,
            ingest,
        }
    }

    /// Negotiate a server-terminated session from a client offer
    ///
    /// Sends exactly one `answer` on success. A failed negotiation closes the
    /// session and leaves the client free to offer again.
    pub async fn handle_offer(&self, id: &ClientId, sdp: &str) -> Result<()> {
        let client = self
            .registry
            .lookup(id)
            .ok_or_else(|| Error::negotiation(id.as_str(), "client not registered"))?;

        let _negotiating = client.negotiation.lock().await;
        if client.is_closing() {
            return Err(Error::negotiation(id.as_str(), "client disconnecting"));
        }
        if client.session().is_some() {
            return Err(Error::DuplicateOffer(id.to_string()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = self.factory.create(id, events_tx).await?;
        let session = Arc::new(Session::new(id.clone(), client.channel.clone(), transport.clone()));
        session.record_offer();
        client.set_session(session.clone());

        // Teardown may have started before the session was stored
        if client.is_closing() {
            session.close().await;
            client.clear_session_if(&session);
            return Err(Error::negotiation(id.as_str(), "client disconnecting"));
        }

        self.spawn_event_pump(Arc::downgrade(&client), session.clone(), events_rx);

        match transport.accept_offer(sdp).await {
            Ok(answer) => {
                if session.answer(&answer) {
                    info!(client_id = %id, "Answer sent");
                }
                Ok(())
            }
            Err(e) => {
                session.close().await;
                client.clear_session_if(&session);
                Err(e)
            }
        }
    }

    /// Apply a remote candidate to the client's session
    pub async fn handle_candidate(&self, id: &ClientId, candidate: IceCandidate) -> Result<()> {
        let session = self
            .registry
            .lookup(id)
            .and_then(|client| client.session())
            .ok_or_else(|| Error::candidate(id.as_str(), "no session"))?;

        if session.state() == SessionState::Closed {
            return Err(Error::candidate(id.as_str(), "session closed"));
        }

        session.transport.add_remote_candidate(candidate).await?;
        session.record_remote_candidate();
        Ok(())
    }

    fn spawn_event_pump(
        &self,
        client: Weak<Client>,
        session: Arc<Session>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let ingest = self.ingest.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    () = session.closed() => None,
                };
                let Some(event) = event else { break };

                let Some(client) = client.upgrade() else { break };
                if client.is_closing() || !client.owns_session(&session) {
                    break;
                }

                match event {
                    TransportEvent::LocalCandidate(candidate) => session.push_local_candidate(candidate),
                    TransportEvent::Track(track) => ingest.on_track(&client, track).await,
                    TransportEvent::Closed => {
                        info!(client_id = %client.id, "Transport closed by peer");
                        session.close().await;
                        client.clear_session_if(&session);
                        break;
                    }
                }
            }
            debug!(client_id = %session.client_id(), "Session event pump stopped");
        });
    }
}
