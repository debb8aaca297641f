//! API integration tests.
//!
//! Exercises the HTTP API against a [`TestHarness`] server running on a
//! random port over a temporary base directory.

mod common;

use common::TestHarness;
use cq_queue::input_hash;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_200() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.expect("request failed");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_accepted_with_output_name() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.add_input("talk.mov");

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/conversions"))
        .json(&json!({ "inputFile": "talk.mov", "format": "mp4", "quality": "high" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let body: Value = resp.json().await.unwrap();
    let hash = input_hash("talk.mov");
    assert_eq!(body["hash"], hash);
    assert_eq!(body["output_file"], format!("{hash}-high.mp4"));

    let snapshot = harness.queue.wait_idle().await.unwrap();
    assert_eq!(snapshot.completed, 1);
}

#[tokio::test]
async fn submit_without_format_is_rejected() {
    let (harness, addr) = TestHarness::with_server().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/conversions"))
        .json(&json!({ "input_file": "talk.mov", "format": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "validation_error");
    assert!(harness.sink.events().is_empty());
}

#[tokio::test]
async fn submit_with_path_outside_upload_dir_is_rejected() {
    let (harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    for input in ["../secret.txt", "/etc/passwd", "nested/talk.mov"] {
        let resp = client
            .post(format!("http://{addr}/api/conversions"))
            .json(&json!({ "input_file": input, "format": "mp4" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{input}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "validation_error");
    }
    assert!(harness.sink.events().is_empty());
}

#[tokio::test]
async fn submit_with_unknown_quality_is_rejected() {
    let (_harness, addr) = TestHarness::with_server().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/conversions"))
        .json(&json!({ "input_file": "talk.mov", "format": "mp4", "quality": "extreme" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

// ---------------------------------------------------------------------------
// Queue and events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_status_reports_counters() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.queue.enqueue(cq_core::ConversionTask::new("missing.mov", "mp3"));
    harness.queue.wait_idle().await.unwrap();

    let body: Value = reqwest::get(format!("http://{addr}/api/queue"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["state"], "idle");
    assert_eq!(body["failed"], 1);
    assert_eq!(body["completed"], 0);
    assert_eq!(body["pending"], 0);
}

#[tokio::test]
async fn recent_events_newest_first_with_limit() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.add_input("a.mov");
    harness.queue.enqueue(cq_core::ConversionTask::new("a.mov", "mp4"));
    harness.queue.wait_idle().await.unwrap();

    let body: Value = reqwest::get(format!("http://{addr}/api/events?limit=2"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let events = body.as_array().expect("array of events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["payload"]["type"], "completed");
    assert_eq!(events[1]["payload"]["type"], "progress");
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn formats_lists_catalog_and_qualities() {
    let (_harness, addr) = TestHarness::with_server().await;
    let body: Value = reqwest::get(format!("http://{addr}/api/formats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let formats = body["formats"].as_array().unwrap();
    assert!(formats.iter().any(|f| f["id"] == "mp4" && f["video_bitrate"] == 1200));
    assert!(formats.iter().any(|f| f["id"] == "flac"));

    let qualities = body["qualities"].as_array().unwrap();
    assert_eq!(qualities.len(), 4);
    assert_eq!(qualities[0]["level"], "low");
}

// ---------------------------------------------------------------------------
// Static outputs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn converted_files_are_served() {
    let (harness, addr) = TestHarness::with_server().await;
    let dir = harness.converted_dir().join("2024-3-7");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("out.mp3"), b"ID3").unwrap();

    let resp = reqwest::get(format!("http://{addr}/converted/2024-3-7/out.mp3"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"ID3");

    let resp = reqwest::get(format!("http://{addr}/converted/2024-3-7/missing.mp3"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn event_stream_replays_recent_events() {
    let (harness, addr) = TestHarness::with_server().await;
    harness.queue.enqueue(cq_core::ConversionTask::new("missing.mov", "mp4"));
    harness.queue.wait_idle().await.unwrap();

    let mut resp = reqwest::get(format!("http://{addr}/api/events/stream"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut received = String::new();
    while !received.contains("event: failed") {
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(5), resp.chunk())
            .await
            .expect("timed out reading event stream")
            .unwrap()
            .expect("stream ended early");
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
    let queued = received.find("event: queued").expect("queued replayed");
    let failed = received.find("event: failed").unwrap();
    assert!(queued < failed);
}
