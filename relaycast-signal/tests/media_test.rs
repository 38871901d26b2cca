// Integration tests for media ingest and transcode orchestration

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{eventually, Harness};
use relaycast_core::models::{ClientId, MediaPacket, TrackKind};
use relaycast_core::Error;
use relaycast_signal::transcode::TranscodePlan;

async fn wait_for_file_len(path: &std::path::Path, len: usize) -> Vec<u8> {
    for _ in 0..200 {
        if let Ok(bytes) = std::fs::read(path) {
            if bytes.len() >= len {
                return bytes;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never reached {len} bytes", path.display());
}

#[tokio::test]
async fn test_video_packets_reach_both_streams() {
    let harness = Harness::new();
    let (client, _rx) = harness.connect("p1");
    harness.offer("p1").await;

    let packets = harness.factory.transport("p1").emit_track(TrackKind::Video);
    packets.send(MediaPacket::new(96, 1000, vec![0xAA, 0xBB])).unwrap();
    packets.send(MediaPacket::new(102, 2000, vec![0xCC])).unwrap();

    let capture = std::path::PathBuf::from(&harness.config.media.capture_dir).join("p1");
    let annexb = wait_for_file_len(&capture.join("video.h264"), 11).await;
    assert_eq!(annexb, vec![0, 0, 0, 1, 0xAA, 0xBB, 0, 0, 0, 1, 0xCC]);

    // Only payload type 96 is in the timestamped set
    let timestamped = wait_for_file_len(&capture.join("video.ivf"), 14).await;
    assert_eq!(&timestamped[0..4], &2u32.to_le_bytes());
    assert_eq!(&timestamped[4..12], &1000u64.to_le_bytes());
    assert_eq!(&timestamped[12..], &[0xAA, 0xBB]);

    assert_eq!(client.sink_count().await, 1);
}

#[tokio::test]
async fn test_audio_is_raw_concatenation() {
    let harness = Harness::new();
    let (_client, _rx) = harness.connect("p1");
    harness.offer("p1").await;

    let packets = harness.factory.transport("p1").emit_track(TrackKind::Audio);
    for chunk in [vec![1u8, 2], vec![3], vec![4, 5]] {
        packets.send(MediaPacket::new(111, 0, chunk)).unwrap();
    }

    let path = std::path::PathBuf::from(&harness.config.media.capture_dir)
        .join("p1")
        .join("audio.opus");
    assert_eq!(wait_for_file_len(&path, 5).await, vec![1, 2, 3, 4, 5]);
    // Audio alone never arms the warm-up timer
    assert_eq!(harness.launcher.launches(), 0);
}

#[tokio::test]
async fn test_first_video_track_arms_one_shot_transcode() {
    let harness = Harness::with_warmup(Duration::from_millis(150));
    let (client, _rx) = harness.connect("p1");
    harness.offer("p1").await;

    let transport = harness.factory.transport("p1");
    let _video = transport.emit_track(TrackKind::Video);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.launcher.launches(), 0);

    eventually(|| harness.launcher.launches() == 1).await;
    assert!(client.has_job());

    let args = harness.launcher.last().args.clone();
    assert!(args.iter().any(|a| a.ends_with("p1/video.h264")));
    assert!(args.iter().any(|a| a.ends_with("stream.m3u8")));
    assert!(!args.iter().any(|a| a == "-filter_complex"));

    // Another video track on the same client does not re-arm the timer
    let _again = transport.emit_track(TrackKind::Video);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.launcher.launches(), 1);
}

#[tokio::test]
async fn test_start_processing_is_idempotent() {
    let harness = Harness::new();
    let (_client, _rx) = harness.connect("p1");
    harness.offer("p1").await;

    let id = ClientId::from("p1");
    let orchestrator = harness.hub.orchestrator();
    let first = orchestrator.start_processing_for(&id).await.unwrap();
    let second = orchestrator.start_processing_for(&id).await.unwrap();

    assert_eq!(first, Some(TranscodePlan::Single { client: id.clone() }));
    assert_eq!(second, None);
    assert_eq!(harness.launcher.launches(), 1);
}

#[tokio::test]
async fn test_start_processing_for_unknown_client_is_noop() {
    let harness = Harness::new();

    let result = harness
        .hub
        .orchestrator()
        .start_processing_for(&ClientId::from("ghost"))
        .await
        .unwrap();

    assert_eq!(result, None);
    assert_eq!(harness.launcher.launches(), 0);
}

#[tokio::test]
async fn test_two_active_sessions_start_composite() {
    let harness = Harness::new();
    let (_a, _rx_a) = harness.connect("a");
    let (_b, _rx_b) = harness.connect("b");
    let (_c, _rx_c) = harness.connect("c");
    // Registration order decides, not offer order
    harness.offer("c").await;
    harness.offer("b").await;
    harness.offer("a").await;

    let plan = harness
        .hub
        .orchestrator()
        .start_processing_for(&ClientId::from("c"))
        .await
        .unwrap();

    assert_eq!(
        plan,
        Some(TranscodePlan::Composite {
            primary: ClientId::from("a"),
            secondary: ClientId::from("b"),
        })
    );
    let args = harness.launcher.last().args.join(" ");
    assert!(args.contains("a/video.h264"));
    assert!(args.contains("b/video.h264"));
    assert!(args.contains("a/audio.opus"));
    assert!(args.contains("[0:v][1:v]hstack=inputs=2[v]"));
    assert!(args.contains("-map 2:a"));
}

#[tokio::test]
async fn test_composite_supersedes_single_writer() {
    let harness = Harness::new();
    let (a, _rx_a) = harness.connect("a");
    let (b, _rx_b) = harness.connect("b");
    let orchestrator = harness.hub.orchestrator();

    harness.offer("a").await;
    let single = orchestrator.start_processing_for(&ClientId::from("a")).await.unwrap();
    assert!(matches!(single, Some(TranscodePlan::Single { .. })));

    harness.offer("b").await;
    let composite = orchestrator.start_processing_for(&ClientId::from("b")).await.unwrap();
    assert!(matches!(composite, Some(TranscodePlan::Composite { .. })));

    assert!(harness.launcher.process(0).is_terminated());
    assert!(!harness.launcher.process(1).is_terminated());
    assert!(!a.has_job());
    assert!(b.has_job());

    let (owner, job) = orchestrator.current_job().unwrap();
    assert_eq!(owner, ClientId::from("b"));
    assert_eq!(job.plan.kind(), "composite");
}

#[tokio::test]
async fn test_second_warmup_for_same_composite_is_noop() {
    let harness = Harness::new();
    let (a, _rx_a) = harness.connect("a");
    let (b, _rx_b) = harness.connect("b");
    harness.offer("a").await;
    harness.offer("b").await;
    let orchestrator = harness.hub.orchestrator();

    let first = orchestrator.start_processing_for(&ClientId::from("a")).await.unwrap();
    assert!(matches!(first, Some(TranscodePlan::Composite { .. })));

    let second = orchestrator.start_processing_for(&ClientId::from("b")).await.unwrap();
    assert_eq!(second, None);

    assert_eq!(harness.launcher.launches(), 1);
    assert!(!harness.launcher.process(0).is_terminated());
    assert!(a.has_job());
    assert!(!b.has_job());
}

#[tokio::test]
async fn test_crashed_encoder_is_not_restarted() {
    let harness = Harness::new();
    let (client, _rx) = harness.connect("p1");
    harness.offer("p1").await;
    let id = ClientId::from("p1");

    harness.hub.orchestrator().start_processing_for(&id).await.unwrap();
    harness.launcher.last().exit(1);

    eventually(|| !client.has_job()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.launcher.launches(), 1);

    // The cleared slot lets a later request retry
    let retry = harness.hub.orchestrator().start_processing_for(&id).await.unwrap();
    assert!(retry.is_some());
    assert_eq!(harness.launcher.launches(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_instant_encoder_exit_always_frees_slot() {
    let harness = Harness::new();
    let (client, _rx) = harness.connect("p1");
    harness.offer("p1").await;
    *harness.launcher.exit_on_launch.lock() = Some(1);

    let id = ClientId::from("p1");
    let orchestrator = harness.hub.orchestrator();
    for attempt in 1..=50 {
        let plan = orchestrator.start_processing_for(&id).await.unwrap();
        assert!(plan.is_some(), "attempt {attempt} was skipped");
        assert_eq!(harness.launcher.launches(), attempt);
        eventually(|| !client.has_job()).await;
    }
}

#[tokio::test]
async fn test_launch_failure_leaves_slot_empty() {
    let harness = Harness::new();
    let (client, _rx) = harness.connect("p1");
    harness.launcher.fail.store(true, Ordering::SeqCst);

    let result = harness
        .hub
        .orchestrator()
        .start_processing_for(&ClientId::from("p1"))
        .await;

    assert!(matches!(result, Err(Error::SubprocessFault(_))));
    assert!(!client.has_job());
}

#[tokio::test]
async fn test_stats_report_output_job() {
    let harness = Harness::new();
    let (_a, _rx) = harness.connect("a");
    harness.offer("a").await;
    harness
        .hub
        .orchestrator()
        .start_processing_for(&ClientId::from("a"))
        .await
        .unwrap();

    let stats = harness.hub.stats().await;
    assert_eq!(stats.clients, 1);
    assert_eq!(stats.active_sessions, 1);
    let output = stats.output.unwrap();
    assert_eq!(output.owner, ClientId::from("a"));
    assert!(output.pid.is_some());
    assert!(stats.playlist.ends_with("stream.m3u8"));
}
