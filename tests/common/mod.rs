//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which runs a real [`QueueManager`] over a
//! temporary base directory with a scripted engine and extractor. The
//! [`TestHarness::with_server`] constructor also starts Axum on a random
//! port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use cq_av::{EncodeProgress, EncodeRequest, EngineEvents, MediaMetadata, MetadataExtractor, TranscodeEngine};
use cq_core::config::{Config, QueueConfig};
use cq_core::{ConversionEvent, Error, EventBus, FanOut, NotificationSink, Result};
use cq_queue::{QueueContext, QueueHandle, QueueManager};
use cq_server::context::AppContext;
use cq_server::router::build_router;

pub const PUBLIC_BASE_URL: &str = "http://10.1.2.3:3000";

pub fn fixed_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
}

/// Date directory produced by [`fixed_today`].
pub const DATE_DIR: &str = "2024-3-7";

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

/// Engine that reports start and one progress line, then blocks until
/// released. Every request is recorded.
pub struct GatedEngine {
    gate: Semaphore,
    requests: Mutex<Vec<EncodeRequest>>,
    fail_with: Option<String>,
}

impl GatedEngine {
    /// Finishes every job immediately.
    pub fn open() -> Self {
        Self::with_permits(Semaphore::MAX_PERMITS)
    }

    /// Holds every job until [`release`](Self::release) is called.
    pub fn closed() -> Self {
        Self::with_permits(0)
    }

    /// Finishes every job immediately with an engine error.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::open()
        }
    }

    fn with_permits(permits: usize) -> Self {
        Self {
            gate: Semaphore::new(permits),
            requests: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    /// Let `n` held jobs finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn requests(&self) -> Vec<EncodeRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TranscodeEngine for GatedEngine {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn transcode(&self, request: &EncodeRequest, events: &EngineEvents) -> Result<()> {
        self.requests.lock().push(request.clone());
        events.started();
        events.progress(EncodeProgress {
            current_kbps: Some(900.0),
            target_size: 4096,
            timemark: "00:00:50.00".into(),
        });

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::Engine(e.to_string()))?;
        permit.forget();

        match &self.fail_with {
            Some(message) => Err(Error::Engine(message.clone())),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted extractor
// ---------------------------------------------------------------------------

/// Returns the same 100 second tagged metadata for every input.
pub struct FixedMetadata(pub MediaMetadata);

impl Default for FixedMetadata {
    fn default() -> Self {
        Self(MediaMetadata {
            duration_secs: 100.0,
            title: Some("Blue Train".into()),
            album: None,
            artist: Some("John Coltrane".into()),
        })
    }
}

#[async_trait]
impl MetadataExtractor for FixedMetadata {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn extract(&self, _path: &Path) -> Result<MediaMetadata> {
        Ok(self.0.clone())
    }
}

/// Fails extraction for every input, as ffprobe does on unreadable media.
pub struct FailingMetadata;

#[async_trait]
impl MetadataExtractor for FailingMetadata {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn extract(&self, path: &Path) -> Result<MediaMetadata> {
        Err(Error::metadata(path, "no duration reported"))
    }
}

// ---------------------------------------------------------------------------
// Recording sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ConversionEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ConversionEvent> {
        self.events.lock().clone()
    }

    /// Event kinds carrying `hash`, in emission order.
    pub fn kinds_for(&self, hash: &str) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.hash() == Some(hash))
            .map(ConversionEvent::kind)
            .collect()
    }

    /// Wait up to five seconds for an event matching `pred`.
    pub async fn wait_for(&self, pred: impl Fn(&ConversionEvent) -> bool) -> ConversionEvent {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(event) = self.events.lock().iter().find(|e| pred(e)).cloned() {
                return event;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for event; saw {:?}",
                self.events()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: &ConversionEvent) {
        self.events.lock().push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub dir: TempDir,
    pub config: Config,
    pub engine: Arc<GatedEngine>,
    pub sink: Arc<RecordingSink>,
    pub event_bus: Arc<EventBus>,
    pub queue: QueueHandle,
    pub cancel: CancellationToken,
}

impl TestHarness {
    /// Queue in skip-and-continue mode with an engine that never blocks.
    pub fn new() -> Self {
        Self::with_engine(GatedEngine::open(), false)
    }

    pub fn with_engine(engine: GatedEngine, fail_closed: bool) -> Self {
        Self::build(engine, Arc::new(FixedMetadata::default()), fail_closed)
    }

    pub fn build(
        engine: GatedEngine,
        extractor: Arc<dyn MetadataExtractor>,
        fail_closed: bool,
    ) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = Config {
            queue: QueueConfig {
                base_dir: dir.path().to_path_buf(),
                fail_closed,
                ..QueueConfig::default()
            },
            ..Config::default()
        };
        std::fs::create_dir_all(config.queue.input_dir()).expect("failed to create input dir");

        let engine = Arc::new(engine);
        let sink = Arc::new(RecordingSink::default());
        let event_bus = Arc::new(EventBus::default());
        let fan_out: Arc<dyn NotificationSink> =
            Arc::new(FanOut::new().with(event_bus.clone()).with(sink.clone()));

        let ctx = QueueContext::new(
            config.queue.clone(),
            engine.clone(),
            extractor,
            fan_out,
            PUBLIC_BASE_URL,
        )
        .with_clock(fixed_today);

        let cancel = CancellationToken::new();
        let queue = QueueManager::spawn(ctx, cancel.clone());

        Self {
            dir,
            config,
            engine,
            sink,
            event_bus,
            queue,
            cancel,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();
        let ctx = AppContext {
            config: Arc::new(harness.config.clone()),
            queue: harness.queue.clone(),
            event_bus: harness.event_bus.clone(),
        };
        let app = build_router(ctx, &harness.config.queue.converted_dir());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Create an input file under `<base>/tmp`.
    pub fn add_input(&self, name: &str) -> PathBuf {
        let path = self.config.queue.input_dir().join(name);
        std::fs::write(&path, b"not really media").expect("failed to write input");
        path
    }

    pub fn converted_dir(&self) -> PathBuf {
        self.config.queue.converted_dir()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
