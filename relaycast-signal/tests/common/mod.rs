// Shared fakes for the signal hub integration tests
//
// FakeTransportFactory stands in for webrtc-rs and FakeLauncher for ffmpeg,
// so the tests exercise the real hub without network or subprocesses.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use relaycast_core::models::{ClientId, MediaPacket, TrackKind};
use relaycast_core::{Config, Error, Result};
use relaycast_signal::protocol::{IceCandidate, SignalEnvelope};
use relaycast_signal::registry::Client;
use relaycast_signal::transcode::{EncoderLauncher, EncoderProcess, ProcessExit};
use relaycast_signal::transport::{InboundTrack, PeerTransport, TransportEvent, TransportFactory};
use relaycast_signal::SignalHub;

/// Offers containing this marker fail negotiation
pub const MALFORMED_SDP: &str = "malformed";

pub struct FakeTransport {
    pub client_id: ClientId,
    events: mpsc::UnboundedSender<TransportEvent>,
    pub remote_candidates: Mutex<Vec<IceCandidate>>,
    pub closes: AtomicUsize,
}

impl FakeTransport {
    pub fn is_closed(&self) -> bool {
        self.closes.load(Ordering::SeqCst) > 0
    }

    /// Surface an inbound track; packets pushed on the returned sender are
    /// delivered in order
    pub fn emit_track(&self, kind: TrackKind) -> mpsc::UnboundedSender<MediaPacket> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.events.send(TransportEvent::Track(Box::new(FakeTrack { kind, packets: rx })));
        tx
    }

    pub fn emit_local_candidate(&self, candidate: &str) {
        let _ = self
            .events
            .send(TransportEvent::LocalCandidate(IceCandidate::new(candidate)));
    }

    pub fn emit_closed(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn accept_offer(&self, offer_sdp: &str) -> Result<String> {
        if offer_sdp.contains(MALFORMED_SDP) {
            return Err(Error::negotiation(self.client_id.as_str(), "unparseable sdp"));
        }
        // Gathering starts while the local description is applied
        self.emit_local_candidate("candidate:host 1 udp 1 127.0.0.1 9 typ host");
        Ok(format!("answer-for:{offer_sdp}"))
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if self.is_closed() {
            return Err(Error::candidate(self.client_id.as_str(), "transport closed"));
        }
        self.remote_candidates.lock().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeTrack {
    kind: TrackKind,
    packets: mpsc::UnboundedReceiver<MediaPacket>,
}

#[async_trait]
impl InboundTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn id(&self) -> String {
        format!("fake-{}", self.kind)
    }

    async fn next_packet(&mut self) -> Option<MediaPacket> {
        self.packets.recv().await
    }
}

#[derive(Default)]
pub struct FakeTransportFactory {
    transports: Mutex<Vec<Arc<FakeTransport>>>,
}

impl FakeTransportFactory {
    pub fn created(&self) -> usize {
        self.transports.lock().len()
    }

    /// Most recent transport created for `id`
    pub fn transport(&self, id: &str) -> Arc<FakeTransport> {
        self.transports
            .lock()
            .iter()
            .rev()
            .find(|t| t.client_id.as_str() == id)
            .cloned()
            .unwrap_or_else(|| panic!("no transport for {id}"))
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(
        &self,
        client_id: &ClientId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        let transport = Arc::new(FakeTransport {
            client_id: client_id.clone(),
            events,
            remote_candidates: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        });
        self.transports.lock().push(transport.clone());
        Ok(transport)
    }
}

/// Observable state of one fake encoder process
pub struct FakeProcessState {
    pub args: Vec<String>,
    pub terminated: AtomicBool,
    exit: watch::Sender<Option<i32>>,
}

impl FakeProcessState {
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Simulate the encoder exiting on its own
    pub fn exit(&self, code: i32) {
        self.exit.send_replace(Some(code));
    }
}

struct FakeProcess {
    state: Arc<FakeProcessState>,
    exit: watch::Receiver<Option<i32>>,
    pid: u32,
}

#[async_trait]
impl EncoderProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        let code = self
            .exit
            .wait_for(Option::is_some)
            .await
            .map(|exit| (*exit).unwrap_or(-1))
            .map_err(|e| Error::SubprocessFault(e.to_string()))?;
        Ok(ProcessExit {
            code: Some(code),
            success: code == 0,
        })
    }

    async fn terminate(&mut self, _grace: Duration) -> Result<ProcessExit> {
        self.state.terminated.store(true, Ordering::SeqCst);
        self.state.exit.send_replace(Some(255));
        Ok(ProcessExit {
            code: None,
            success: false,
        })
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    processes: Mutex<Vec<Arc<FakeProcessState>>>,
    pub fail: AtomicBool,
    /// Exit code every launched process has already exited with
    pub exit_on_launch: Mutex<Option<i32>>,
}

impl FakeLauncher {
    pub fn launches(&self) -> usize {
        self.processes.lock().len()
    }

    pub fn process(&self, index: usize) -> Arc<FakeProcessState> {
        self.processes.lock()[index].clone()
    }

    pub fn last(&self) -> Arc<FakeProcessState> {
        self.processes
            .lock()
            .last()
            .cloned()
            .expect("no encoder launched")
    }
}

#[async_trait]
impl EncoderLauncher for FakeLauncher {
    async fn launch(&self, args: &[String]) -> Result<Box<dyn EncoderProcess>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::SubprocessFault("spawn refused".to_string()));
        }

        let (exit_tx, exit_rx) = watch::channel(*self.exit_on_launch.lock());
        let state = Arc::new(FakeProcessState {
            args: args.to_vec(),
            terminated: AtomicBool::new(false),
            exit: exit_tx,
        });

        let mut processes = self.processes.lock();
        processes.push(state.clone());
        let pid = 1000 + processes.len() as u32;

        Ok(Box::new(FakeProcess {
            state,
            exit: exit_rx,
            pid,
        }))
    }
}

pub struct Harness {
    pub hub: Arc<SignalHub>,
    pub factory: Arc<FakeTransportFactory>,
    pub launcher: Arc<FakeLauncher>,
    pub config: Config,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_warmup(Duration::from_secs(3600))
    }

    pub fn with_warmup(warmup: Duration) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.media.capture_dir = dir.path().join("captures").display().to_string();
        config.media.warmup_delay_ms = u64::try_from(warmup.as_millis()).unwrap();
        config.transcode.output_dir = dir.path().join("hls").display().to_string();

        let factory = Arc::new(FakeTransportFactory::default());
        let launcher = Arc::new(FakeLauncher::default());
        let hub = SignalHub::new(&config, factory.clone(), launcher.clone());

        Self {
            hub,
            factory,
            launcher,
            config,
            dir,
        }
    }

    pub fn connect(&self, id: &str) -> (Arc<Client>, mpsc::Receiver<SignalEnvelope>) {
        self.hub.connect(Some(id)).unwrap()
    }

    pub async fn send(&self, from: &str, json: &str) {
        let message = SignalEnvelope::from_json(json).unwrap();
        self.hub.dispatch(&ClientId::from(from), message).await;
    }

    pub async fn offer(&self, from: &str) {
        self.send(from, r#"{"type":"offer","payload":{"sdp":"v=0 offer"}}"#).await;
    }
}

pub async fn recv(rx: &mut mpsc::Receiver<SignalEnvelope>) -> SignalEnvelope {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

/// Drain whatever is queued after letting spawned tasks run
pub async fn drain(rx: &mut mpsc::Receiver<SignalEnvelope>) -> Vec<SignalEnvelope> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
