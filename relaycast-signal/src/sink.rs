//! Media sinks
//!
//! Packets are appended in arrival order with no depacketization,
//! reordering or loss recovery. A lost or reordered packet ends up as
//! corrupt bytes in the capture file; the encoder downstream copes or not.
//! A real depacketizer can replace these behind `MediaSink`.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use relaycast_core::models::{ClientId, MediaPacket};
use relaycast_core::{Error, Result};

/// Per (client, kind) output stream
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Append one packet. Writes after `finish` are discarded.
    async fn write_packet(&self, packet: &MediaPacket) -> Result<()>;

    /// Flush and close; later calls do nothing
    async fn finish(&self) -> Result<()>;

    fn is_finished(&self) -> bool;

    fn stats(&self) -> SinkStats;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub packets_written: u64,
    pub bytes_written: u64,
    pub last_timestamp: Option<u32>,
}

impl SinkStats {
    fn merge(self, other: Self) -> Self {
        Self {
            packets_written: self.packets_written.max(other.packets_written),
            bytes_written: self.bytes_written + other.bytes_written,
            last_timestamp: self.last_timestamp.or(other.last_timestamp),
        }
    }
}

/// Byte layout of one packet on disk
pub trait Framing: Send + Sync + 'static {
    fn frame(packet: &MediaPacket, out: &mut BytesMut);
}

/// `00 00 00 01` start code, then the payload
pub struct AnnexB;

impl Framing for AnnexB {
    fn frame(packet: &MediaPacket, out: &mut BytesMut) {
        out.reserve(4 + packet.payload.len());
        out.put_slice(&[0, 0, 0, 1]);
        out.put_slice(&packet.payload);
    }
}

/// 12-byte header (u32 LE payload length, u64 LE timestamp), then the payload
pub struct Timestamped;

impl Framing for Timestamped {
    fn frame(packet: &MediaPacket, out: &mut BytesMut) {
        out.reserve(12 + packet.payload.len());
        // Payload length of an RTP packet always fits in u32
        out.put_u32_le(packet.payload.len() as u32);
        out.put_u64_le(u64::from(packet.timestamp));
        out.put_slice(&packet.payload);
    }
}

/// Payload bytes only
pub struct Raw;

impl Framing for Raw {
    fn frame(packet: &MediaPacket, out: &mut BytesMut) {
        out.put_slice(&packet.payload);
    }
}

pub type AnnexBSink = FileSink<AnnexB>;
pub type TimestampedSink = FileSink<Timestamped>;
pub type RawSink = FileSink<Raw>;

/// Append-only file with a fixed packet framing
pub struct FileSink<F: Framing> {
    path: PathBuf,
    file: tokio::sync::Mutex<Option<File>>,
    stats: Mutex<SinkStats>,
    finished: AtomicBool,
    _framing: PhantomData<F>,
}

impl<F: Framing> FileSink<F> {
    /// Create (or truncate) the file at `path`, creating parent directories
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(&path).await?;
        debug!(path = %path.display(), "Opened media sink");

        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(Some(file)),
            stats: Mutex::new(SinkStats::default()),
            finished: AtomicBool::new(false),
            _framing: PhantomData,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_fault(&self, e: &std::io::Error) -> Error {
        Error::StreamWriteFault(format!("{}: {e}", self.path.display()))
    }
}

#[async_trait]
impl<F: Framing> MediaSink for FileSink<F> {
    async fn write_packet(&self, packet: &MediaPacket) -> Result<()> {
        let mut buf = BytesMut::new();
        F::frame(packet, &mut buf);

        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            return Ok(());
        };
        file.write_all(&buf).await.map_err(|e| self.write_fault(&e))?;

        let mut stats = self.stats.lock();
        stats.packets_written += 1;
        stats.bytes_written += buf.len() as u64;
        stats.last_timestamp = Some(packet.timestamp);
        Ok(())
    }

    async fn finish(&self) -> Result<()> {
        self.finished.store(true, Ordering::Release);
        let Some(mut file) = self.file.lock().await.take() else {
            return Ok(());
        };
        file.flush().await.map_err(|e| self.write_fault(&e))?;
        debug!(path = %self.path.display(), "Closed media sink");
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn stats(&self) -> SinkStats {
        *self.stats.lock()
    }
}

/// Video sink: every packet to the Annex-B stream, selected payload types
/// also to the timestamped stream
pub struct VideoCapture {
    annexb: AnnexBSink,
    timestamped: TimestampedSink,
    timestamped_types: Vec<u8>,
}

impl VideoCapture {
    pub async fn create(layout: &MediaLayout, client: &ClientId, timestamped_types: Vec<u8>) -> Result<Self> {
        Ok(Self {
            annexb: AnnexBSink::create(layout.video_annexb(client)).await?,
            timestamped: TimestampedSink::create(layout.video_timestamped(client)).await?,
            timestamped_types,
        })
    }
}

#[async_trait]
impl MediaSink for VideoCapture {
    async fn write_packet(&self, packet: &MediaPacket) -> Result<()> {
        let annexb = self.annexb.write_packet(packet).await;
        if self.timestamped_types.contains(&packet.payload_type) {
            self.timestamped.write_packet(packet).await?;
        }
        annexb
    }

    async fn finish(&self) -> Result<()> {
        let annexb = self.annexb.finish().await;
        self.timestamped.finish().await?;
        annexb
    }

    fn is_finished(&self) -> bool {
        self.annexb.is_finished()
    }

    fn stats(&self) -> SinkStats {
        self.annexb.stats().merge(self.timestamped.stats())
    }
}

/// On-disk locations of per-client capture files
#[derive(Debug, Clone)]
pub struct MediaLayout {
    root: PathBuf,
}

impl MediaLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Client ids are caller supplied. Bytes outside `[A-Za-z0-9_-]` are
    /// written as `~XX` (uppercase hex), so the id cannot escape the capture
    /// root and distinct ids always get distinct directories.
    #[must_use]
    pub fn client_dir(&self, client: &ClientId) -> PathBuf {
        let mut name = String::with_capacity(client.as_str().len());
        for byte in client.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("~{byte:02X}"));
            }
        }
        self.root.join(name)
    }

    #[must_use]
    pub fn video_annexb(&self, client: &ClientId) -> PathBuf {
        self.client_dir(client).join("video.h264")
    }

    #[must_use]
    pub fn video_timestamped(&self, client: &ClientId) -> PathBuf {
        self.client_dir(client).join("video.ivf")
    }

    #[must_use]
    pub fn audio(&self, client: &ClientId) -> PathBuf {
        self.client_dir(client).join("audio.opus")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_annexb_framing() {
        let dir = TempDir::new().unwrap();
        let sink = AnnexBSink::create(dir.path().join("v.h264")).await.unwrap();

        sink.write_packet(&MediaPacket::new(102, 10, vec![0xAA, 0xBB])).await.unwrap();
        sink.write_packet(&MediaPacket::new(102, 20, vec![0xCC])).await.unwrap();
        sink.finish().await.unwrap();

        let bytes = std::fs::read(sink.path()).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 1, 0xAA, 0xBB, 0, 0, 0, 1, 0xCC]);
        assert_eq!(sink.stats().packets_written, 2);
        assert_eq!(sink.stats().last_timestamp, Some(20));
    }

    #[tokio::test]
    async fn test_timestamped_header() {
        let dir = TempDir::new().unwrap();
        let sink = TimestampedSink::create(dir.path().join("v.ivf")).await.unwrap();

        sink.write_packet(&MediaPacket::new(96, 0x0102_0304, vec![7, 8, 9])).await.unwrap();
        sink.finish().await.unwrap();

        let bytes = std::fs::read(sink.path()).unwrap();
        assert_eq!(bytes.len(), 15);
        assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..12], &0x0102_0304u64.to_le_bytes());
        assert_eq!(&bytes[12..], &[7, 8, 9]);
    }

    #[tokio::test]
    async fn test_writes_after_finish_are_discarded() {
        let dir = TempDir::new().unwrap();
        let sink = RawSink::create(dir.path().join("a.opus")).await.unwrap();

        sink.write_packet(&MediaPacket::new(111, 1, vec![1, 2])).await.unwrap();
        sink.finish().await.unwrap();
        sink.finish().await.unwrap();
        sink.write_packet(&MediaPacket::new(111, 2, vec![3, 4])).await.unwrap();

        assert!(sink.is_finished());
        assert_eq!(std::fs::read(sink.path()).unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_video_capture_selects_timestamped_types() {
        let dir = TempDir::new().unwrap();
        let layout = MediaLayout::new(dir.path());
        let client = ClientId::from("p1");
        let capture = VideoCapture::create(&layout, &client, vec![96]).await.unwrap();

        capture.write_packet(&MediaPacket::new(96, 1, vec![1])).await.unwrap();
        capture.write_packet(&MediaPacket::new(102, 2, vec![2])).await.unwrap();
        capture.finish().await.unwrap();

        let annexb = std::fs::read(layout.video_annexb(&client)).unwrap();
        let timestamped = std::fs::read(layout.video_timestamped(&client)).unwrap();
        assert_eq!(annexb.len(), 2 * 5);
        assert_eq!(timestamped.len(), 13);
    }

    #[test]
    fn test_layout_escapes_client_dir() {
        let layout = MediaLayout::new("/captures");
        assert_eq!(
            layout.client_dir(&ClientId::from("../etc/p 1")),
            PathBuf::from("/captures/~2E~2E~2Fetc~2Fp~201")
        );
        assert_eq!(
            layout.audio(&ClientId::from("p-1_x")),
            PathBuf::from("/captures/p-1_x/audio.opus")
        );
    }

    #[test]
    fn test_layout_keeps_similar_ids_apart() {
        let layout = MediaLayout::new("/captures");
        let ids = ["alice.cam", "alice_cam", "alice~2Ecam", "alice cam", "alicé"];

        let dirs: std::collections::HashSet<_> = ids
            .iter()
            .map(|id| layout.client_dir(&ClientId::from(*id)))
            .collect();
        assert_eq!(dirs.len(), ids.len());
        assert_eq!(
            layout.video_annexb(&ClientId::from("alice.cam")),
            PathBuf::from("/captures/alice~2Ecam/video.h264")
        );
    }

    #[tokio::test]
    async fn test_similar_ids_do_not_clobber_captures() {
        let dir = TempDir::new().unwrap();
        let layout = MediaLayout::new(dir.path());
        let dotted = ClientId::from("alice.cam");
        let underscored = ClientId::from("alice_cam");

        let first = RawSink::create(layout.audio(&dotted)).await.unwrap();
        first.write_packet(&MediaPacket::new(111, 1, vec![1, 2, 3])).await.unwrap();
        first.finish().await.unwrap();

        let second = RawSink::create(layout.audio(&underscored)).await.unwrap();
        second.write_packet(&MediaPacket::new(111, 1, vec![9])).await.unwrap();
        second.finish().await.unwrap();

        assert_eq!(std::fs::read(layout.audio(&dotted)).unwrap(), vec![1, 2, 3]);
        assert_eq!(std::fs::read(layout.audio(&underscored)).unwrap(), vec![9]);
    }
}
