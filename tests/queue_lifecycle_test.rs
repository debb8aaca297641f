//! Queue lifecycle tests.
//!
//! Drives a real [`QueueManager`] with the scripted engine and extractor
//! from [`common`] and checks the notification sequence it produces.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FailingMetadata, GatedEngine, TestHarness, DATE_DIR, PUBLIC_BASE_URL};
use cq_core::{ConversionEvent, ConversionTask, QualityLevel};
use cq_queue::{input_hash, QueueState};

fn is_started(hash: &str) -> impl Fn(&ConversionEvent) -> bool + '_ {
    move |e| matches!(e, ConversionEvent::Started { hash: h } if h == hash)
}

fn is_terminal_for(hash: &str) -> impl Fn(&ConversionEvent) -> bool + '_ {
    move |e| e.is_terminal() && e.hash() == Some(hash)
}

// ---------------------------------------------------------------------------
// Exclusivity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_task_waits_for_first_to_finish() {
    let harness = TestHarness::with_engine(GatedEngine::closed(), false);
    harness.add_input("a.mov");
    harness.add_input("b.mov");
    let hash_a = input_hash("a.mov");
    let hash_b = input_hash("b.mov");

    harness
        .queue
        .enqueue(ConversionTask::new("a.mov", "mp4").with_quality(QualityLevel::High));
    harness.queue.enqueue(ConversionTask::new("b.mov", "mp4"));

    harness.sink.wait_for(is_started(&hash_a)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.sink.kinds_for(&hash_b).is_empty());

    let snapshot = harness.queue.snapshot().await.unwrap();
    assert_eq!(snapshot.state, QueueState::Encoding);
    assert_eq!(snapshot.active.as_deref(), Some(hash_a.as_str()));
    assert_eq!(snapshot.pending, 1);

    harness.engine.release(1);
    harness.sink.wait_for(is_started(&hash_b)).await;
    assert_eq!(harness.sink.kinds_for(&hash_a), ["started", "progress", "completed"]);

    harness.engine.release(1);
    let snapshot = harness.queue.wait_idle().await.unwrap();
    assert_eq!(snapshot.state, QueueState::Idle);
    assert_eq!(snapshot.completed, 2);
    assert_eq!(snapshot.failed, 0);

    let requests = harness.engine.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].video_bitrate_kbps, 1800);
    assert_eq!(requests[0].preset, "slow");
    assert_eq!(requests[1].video_bitrate_kbps, 1200);
}

#[tokio::test]
async fn every_task_is_announced_before_processing() {
    let harness = TestHarness::with_engine(GatedEngine::closed(), false);
    harness.add_input("a.mov");

    let first = harness.queue.enqueue(ConversionTask::new("a.mov", "mp3"));
    let second = harness
        .queue
        .enqueue(ConversionTask::new("b.mov", "webm").with_quality(QualityLevel::Low));

    harness.sink.wait_for(is_started(&input_hash("a.mov"))).await;
    let queued: Vec<String> = harness
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ConversionEvent::Queued { output_file, .. } => Some(output_file),
            _ => None,
        })
        .collect();
    assert_eq!(queued, [first.clone(), second.clone()]);
    assert!(second.ends_with("-low.webm"));

    let snapshot = harness.queue.snapshot().await.unwrap();
    assert_eq!(snapshot.pending_outputs, [second]);
    harness.engine.release(2);
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_reports_dated_url_and_tags() {
    let harness = TestHarness::new();
    harness.add_input("song.wav");
    let output_file = harness
        .queue
        .enqueue(ConversionTask::new("song.wav", "mp3").with_quality(QualityLevel::Ultra));

    let hash = input_hash("song.wav");
    let event = harness.sink.wait_for(is_terminal_for(&hash)).await;
    match event {
        ConversionEvent::Completed {
            url,
            output_file: reported,
            title,
            album,
            artist,
            ..
        } => {
            assert_eq!(url, format!("{PUBLIC_BASE_URL}/converted/{DATE_DIR}/{output_file}"));
            assert_eq!(reported, output_file);
            assert_eq!(title, "Blue Train");
            assert_eq!(album, "");
            assert_eq!(artist, "John Coltrane");
        }
        other => panic!("expected completed, got {other:?}"),
    }

    let request = &harness.engine.requests()[0];
    assert_eq!(request.container, "mp3");
    assert_eq!(request.audio_codec, "libmp3lame");
    assert_eq!(request.audio_bitrate_kbps, 240);
    assert_eq!(
        request.output,
        harness.converted_dir().join(DATE_DIR).join(&output_file)
    );
    assert!(harness.converted_dir().join(DATE_DIR).is_dir());
}

#[tokio::test]
async fn progress_carries_percent_of_duration() {
    let harness = TestHarness::new();
    harness.add_input("clip.mkv");
    harness.queue.enqueue(ConversionTask::new("clip.mkv", "mkv"));

    let hash = input_hash("clip.mkv");
    let event = harness
        .sink
        .wait_for(|e| matches!(e, ConversionEvent::Progress { hash: h, .. } if *h == hash))
        .await;
    match event {
        ConversionEvent::Progress {
            percent,
            target_size,
            current_kbps,
            timemark,
            ..
        } => {
            assert_eq!(percent, 50);
            assert_eq!(target_size, 4096);
            assert_eq!(current_kbps, Some(900.0));
            assert_eq!(timemark, "00:00:50.00");
        }
        other => panic!("expected progress, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_format_falls_back_to_defaults() {
    let harness = TestHarness::new();
    harness.add_input("a.mov");
    let output_file = harness.queue.enqueue(ConversionTask::new("a.mov", "xyz"));
    assert!(output_file.ends_with(".xyz"));

    let snapshot = harness.queue.wait_idle().await.unwrap();
    assert_eq!(snapshot.completed, 1);

    let request = &harness.engine.requests()[0];
    assert_eq!(request.video_codec, "libx264");
    assert_eq!(request.audio_codec, "aac");
    assert_eq!(request.video_bitrate_kbps, 1200);
    assert_eq!(request.audio_bitrate_kbps, 320);
    assert_eq!(request.container, "xyz");
}

#[tokio::test]
async fn task_overrides_beat_catalog() {
    let harness = TestHarness::new();
    harness.add_input("a.mov");
    harness.queue.enqueue(
        ConversionTask::new("a.mov", "mp4")
            .with_video_codec("libx265")
            .with_video_bitrate(3000)
            .with_size("1280x?")
            .with_aspect("16:9"),
    );
    harness.queue.wait_idle().await.unwrap();

    let request = &harness.engine.requests()[0];
    assert_eq!(request.video_codec, "libx265");
    assert_eq!(request.video_bitrate_kbps, 3000);
    assert_eq!(request.audio_codec, "aac");
    assert_eq!(request.size.as_deref(), Some("1280x?"));
    assert_eq!(request.aspect.as_deref(), Some("16:9"));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_input_is_skipped_and_queue_continues() {
    let harness = TestHarness::new();
    harness.add_input("b.mov");
    harness.queue.enqueue(ConversionTask::new("missing.mov", "mp4"));
    harness.queue.enqueue(ConversionTask::new("b.mov", "mp4"));

    let snapshot = harness.queue.wait_idle().await.unwrap();
    assert_eq!(snapshot.state, QueueState::Idle);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.completed, 1);

    assert_eq!(harness.sink.kinds_for(&input_hash("missing.mov")), ["failed"]);
    assert_eq!(
        harness.sink.kinds_for(&input_hash("b.mov")),
        ["started", "progress", "completed"]
    );
    assert_eq!(harness.engine.requests().len(), 1);
}

#[tokio::test]
async fn missing_input_halts_fail_closed_queue() {
    let harness = TestHarness::with_engine(GatedEngine::open(), true);
    harness.add_input("b.mov");
    harness.queue.enqueue(ConversionTask::new("missing.mov", "mp4"));
    harness.queue.enqueue(ConversionTask::new("b.mov", "mp4"));

    let snapshot = harness.queue.wait_idle().await.unwrap();
    assert_eq!(snapshot.state, QueueState::Halted);
    assert_eq!(snapshot.pending, 1);
    assert_eq!(snapshot.active, None);

    assert!(harness
        .sink
        .events()
        .iter()
        .all(|e| matches!(e, ConversionEvent::Queued { .. })));
    assert!(harness.engine.requests().is_empty());
}

#[tokio::test]
async fn engine_failure_is_reported_and_queue_continues() {
    let harness = TestHarness::with_engine(GatedEngine::failing("ffmpeg exited with status 1"), false);
    harness.add_input("a.mov");
    harness.add_input("b.mov");
    harness.queue.enqueue(ConversionTask::new("a.mov", "mp4"));
    harness.queue.enqueue(ConversionTask::new("b.mov", "mp4"));

    let snapshot = harness.queue.wait_idle().await.unwrap();
    assert_eq!(snapshot.failed, 2);
    assert_eq!(snapshot.completed, 0);

    let event = harness.sink.wait_for(is_terminal_for(&input_hash("a.mov"))).await;
    match event {
        ConversionEvent::Failed { error, .. } => assert!(error.contains("status 1"), "{error}"),
        other => panic!("expected failed, got {other:?}"),
    }
}

#[tokio::test]
async fn events_reach_the_bus() {
    let harness = TestHarness::new();
    harness.add_input("a.mov");
    harness.queue.enqueue(ConversionTask::new("a.mov", "mp4"));
    harness.queue.wait_idle().await.unwrap();

    let kinds: Vec<&str> = harness
        .event_bus
        .recent_events(10)
        .iter()
        .map(|e| e.payload.kind())
        .collect();
    assert_eq!(kinds, ["completed", "progress", "started", "queued"]);
}

#[tokio::test]
async fn inputs_outside_upload_dir_are_rejected() {
    let harness = TestHarness::new();
    std::fs::write(harness.dir.path().join("secret.txt"), b"do not serve").unwrap();
    let outside = tempfile::NamedTempFile::new().unwrap();
    let outside_path = outside.path().to_string_lossy().to_string();
    harness.add_input("b.mov");

    harness.queue.enqueue(ConversionTask::new("../secret.txt", "mp4"));
    harness.queue.enqueue(ConversionTask::new(outside_path.clone(), "mp4"));
    harness.queue.enqueue(ConversionTask::new("b.mov", "mp4"));

    let snapshot = harness.queue.wait_idle().await.unwrap();
    assert_eq!(snapshot.state, QueueState::Idle);
    assert_eq!(snapshot.failed, 2);
    assert_eq!(snapshot.completed, 1);

    for name in ["../secret.txt", outside_path.as_str()] {
        assert_eq!(harness.sink.kinds_for(&input_hash(name)), ["failed"], "{name}");
    }

    let requests = harness.engine.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].input, harness.config.queue.input_dir().join("b.mov"));
}

#[tokio::test]
async fn metadata_failure_is_skipped_and_queue_continues() {
    let harness = TestHarness::build(GatedEngine::open(), Arc::new(FailingMetadata), false);
    harness.add_input("a.mov");
    harness.add_input("b.mov");
    harness.queue.enqueue(ConversionTask::new("a.mov", "mp4"));
    harness.queue.enqueue(ConversionTask::new("b.mov", "mp4"));

    let snapshot = harness.queue.wait_idle().await.unwrap();
    assert_eq!(snapshot.state, QueueState::Idle);
    assert_eq!(snapshot.failed, 2);

    for name in ["a.mov", "b.mov"] {
        assert_eq!(harness.sink.kinds_for(&input_hash(name)), ["failed"]);
    }
    let event = harness.sink.wait_for(is_terminal_for(&input_hash("a.mov"))).await;
    match event {
        ConversionEvent::Failed { error, .. } => {
            assert!(error.contains("no duration reported"), "{error}")
        }
        other => panic!("expected failed, got {other:?}"),
    }
    assert!(harness.engine.requests().is_empty());
}

#[tokio::test]
async fn metadata_failure_halts_fail_closed_queue() {
    let harness = TestHarness::build(GatedEngine::open(), Arc::new(FailingMetadata), true);
    harness.add_input("a.mov");
    harness.add_input("b.mov");
    harness.queue.enqueue(ConversionTask::new("a.mov", "mp4"));
    harness.queue.enqueue(ConversionTask::new("b.mov", "mp4"));

    let snapshot = harness.queue.wait_idle().await.unwrap();
    assert_eq!(snapshot.state, QueueState::Halted);
    assert_eq!(snapshot.pending, 1);
    assert!(harness.sink.kinds_for(&input_hash("a.mov")).is_empty());
    assert!(harness.engine.requests().is_empty());
}

#[tokio::test]
async fn unwritable_output_dir_is_a_resolution_failure() {
    let harness = TestHarness::new();
    harness.add_input("a.mov");
    std::fs::write(harness.converted_dir(), b"not a directory").unwrap();

    harness.queue.enqueue(ConversionTask::new("a.mov", "mp4"));
    let snapshot = harness.queue.wait_idle().await.unwrap();
    assert_eq!(snapshot.failed, 1);

    let event = harness.sink.wait_for(is_terminal_for(&input_hash("a.mov"))).await;
    match event {
        ConversionEvent::Failed { error, .. } => {
            assert!(error.starts_with("Resolution error"), "{error}");
            assert!(error.contains("cannot create output directory"), "{error}");
        }
        other => panic!("expected failed, got {other:?}"),
    }
    assert!(harness.engine.requests().is_empty());
}
