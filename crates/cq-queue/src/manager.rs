//! The queue actor.
//!
//! One tokio task owns the FIFO, the active [`Job`] and the lifecycle state.
//! Callers talk to it through a cloneable [`QueueHandle`]. Resolution and
//! encoding run on spawned tasks that report back over the same channel, so
//! the actor itself never awaits I/O.
//!
//! Exactly one job is in `Resolving` or `Encoding` at any time. The queue
//! advances only when the active job reaches a terminal state.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use cq_av::{EncodeRequest, EngineEvents, EngineSignal, MediaMetadata, MetadataExtractor, TranscodeEngine};
use cq_core::config::QueueConfig;
use cq_core::{is_plain_file_name, ConversionEvent, ConversionTask, Error, NotificationSink, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::lookup_format;
use crate::job::{Job, JobState};
use crate::naming::{dated_dir_name, input_hash, output_file_name};
use crate::progress::estimate_percent;
use crate::resolver::{resolve_task, ResolvedEncodeParameters};

/// Everything the actor needs from the outside world.
#[derive(Clone)]
pub struct QueueContext {
    pub config: QueueConfig,
    pub engine: Arc<dyn TranscodeEngine>,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub sink: Arc<dyn NotificationSink>,
    /// `http://<host>:<port>`, prefix of completion URLs.
    pub public_base_url: String,
    /// Date used for the output subdirectory, read once per job.
    pub today: fn() -> NaiveDate,
}

impl QueueContext {
    pub fn new(
        config: QueueConfig,
        engine: Arc<dyn TranscodeEngine>,
        extractor: Arc<dyn MetadataExtractor>,
        sink: Arc<dyn NotificationSink>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            config,
            engine,
            extractor,
            sink,
            public_base_url: public_base_url.into(),
            today: local_today,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }
}

fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Queue-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Idle,
    Resolving,
    Encoding,
    /// A resolution failure stopped the queue (fail-closed mode).
    Halted,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub state: QueueState,
    /// Hash of the job in `Resolving`/`Encoding`.
    pub active: Option<String>,
    pub pending: usize,
    pub pending_outputs: Vec<String>,
    pub completed: u64,
    pub failed: u64,
}

struct Resolved {
    params: ResolvedEncodeParameters,
    metadata: MediaMetadata,
}

enum Command {
    Enqueue {
        task: ConversionTask,
        output_file: String,
    },
    Resolved {
        ticket: u64,
        outcome: Result<Resolved>,
    },
    Engine {
        ticket: u64,
        signal: EngineSignal,
    },
    Finished {
        ticket: u64,
        outcome: Result<()>,
    },
    Snapshot(oneshot::Sender<QueueSnapshot>),
    WaitIdle(oneshot::Sender<QueueSnapshot>),
}

/// Cloneable handle to a running queue.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl QueueHandle {
    /// Append a task and return its output file name.
    ///
    /// Never blocks and never fails; problems with the task surface later
    /// as a `failed` notification.
    pub fn enqueue(&self, task: ConversionTask) -> String {
        let output_file = output_file_name(&task.input_file, &task.format, task.quality);
        let command = Command::Enqueue {
            task,
            output_file: output_file.clone(),
        };
        if self.tx.send(command).is_err() {
            tracing::error!(output_file = %output_file, "queue is not running; task dropped");
        }
        output_file
    }

    /// Current queue state.
    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Resolve once the queue is `Idle` or `Halted`.
    pub async fn wait_idle(&self) -> Result<QueueSnapshot> {
        self.request(Command::WaitIdle).await
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<QueueSnapshot>) -> Command,
    ) -> Result<QueueSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| Error::Internal("queue is not running".into()))?;
        rx.await
            .map_err(|_| Error::Internal("queue stopped before replying".into()))
    }
}

/// The actor. Construct with [`QueueManager::spawn`].
pub struct QueueManager {
    ctx: QueueContext,
    tx: mpsc::WeakUnboundedSender<Command>,
    pending: VecDeque<(ConversionTask, String)>,
    active: Option<Job>,
    in_flight: Option<AbortHandle>,
    state: QueueState,
    next_ticket: u64,
    completed: u64,
    failed: u64,
    idle_waiters: Vec<oneshot::Sender<QueueSnapshot>>,
}

impl QueueManager {
    /// Start the actor on the current runtime.
    ///
    /// The actor stops when `cancel` fires (aborting any in-flight encode) or
    /// when every handle is dropped while idle.
    pub fn spawn(ctx: QueueContext, cancel: CancellationToken) -> QueueHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = QueueManager {
            ctx,
            tx: tx.downgrade(),
            pending: VecDeque::new(),
            active: None,
            in_flight: None,
            state: QueueState::Idle,
            next_ticket: 0,
            completed: 0,
            failed: 0,
            idle_waiters: Vec::new(),
        };
        tokio::spawn(manager.run(rx, cancel));
        QueueHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        tracing::info!(
            base_dir = %self.ctx.config.base_dir.display(),
            fail_closed = self.ctx.config.fail_closed,
            "Conversion queue started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Conversion queue shutting down");
                    break;
                }
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        if let Some(work) = self.in_flight.take() {
            work.abort();
        }
        tracing::info!(pending = self.pending.len(), "Conversion queue stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue { task, output_file } => self.on_enqueue(task, output_file),
            Command::Resolved { ticket, outcome } => {
                if self.is_current(ticket, "resolution") {
                    match outcome {
                        Ok(resolved) => self.start_encode(resolved),
                        Err(e) => self.on_resolution_failed(e),
                    }
                }
            }
            Command::Engine { ticket, signal } => {
                if self.is_current(ticket, "engine") {
                    self.on_engine_signal(signal);
                }
            }
            Command::Finished { ticket, outcome } => {
                if self.is_current(ticket, "finish") {
                    self.on_finished(outcome);
                }
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::WaitIdle(reply) => {
                if self.is_settled() {
                    let _ = reply.send(self.snapshot());
                } else {
                    self.idle_waiters.push(reply);
                }
            }
        }
    }

    fn on_enqueue(&mut self, task: ConversionTask, output_file: String) {
        tracing::info!(
            input = %task.input_file,
            format = %task.format,
            output_file = %output_file,
            "Task queued"
        );
        self.ctx.sink.notify(&ConversionEvent::Queued {
            output_file: output_file.clone(),
            task: task.clone(),
        });
        self.pending.push_back((task, output_file));

        if self.state == QueueState::Idle {
            self.process_next();
        }
    }

    fn process_next(&mut self) {
        self.active = None;
        self.in_flight = None;

        let Some((task, output_file)) = self.pending.pop_front() else {
            self.state = QueueState::Idle;
            tracing::debug!("Conversion queue idle");
            self.notify_settled();
            return;
        };

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let date_dir = dated_dir_name((self.ctx.today)());
        let input_path = self.ctx.config.input_dir().join(&task.input_file);
        let output_dir = self.ctx.config.converted_dir().join(&date_dir);
        let output_path = output_dir.join(&output_file);
        let hash = input_hash(&task.input_file);

        tracing::info!(
            hash = %hash,
            input = %input_path.display(),
            output = %output_path.display(),
            "Processing conversion job"
        );

        let job = Job {
            ticket,
            task: task.clone(),
            hash,
            output_file,
            date_dir,
            input_path: input_path.clone(),
            output_path,
            state: JobState::Resolving,
            params: None,
            metadata: None,
        };
        self.active = Some(job);
        self.state = QueueState::Resolving;

        let Some(tx) = self.tx.upgrade() else {
            tracing::warn!("no queue handles remain; job not started");
            return;
        };
        let extractor = self.ctx.extractor.clone();
        let work = tokio::spawn(async move {
            resolve_job(extractor.as_ref(), &input_path, &output_dir, &task).await
        });
        self.in_flight = Some(work.abort_handle());
        tokio::spawn(async move {
            let outcome = work.await.unwrap_or_else(|e| {
                Err(Error::Resolution(format!("resolution task ended abnormally: {e}")))
            });
            let _ = tx.send(Command::Resolved { ticket, outcome });
        });
    }

    fn start_encode(&mut self, resolved: Resolved) {
        let Some(tx) = self.tx.upgrade() else {
            tracing::warn!("no queue handles remain; encode not started");
            return;
        };
        let Some(job) = self.active.as_mut() else {
            return;
        };

        let request = EncodeRequest {
            input: job.input_path.clone(),
            output: job.output_path.clone(),
            container: resolved.params.container.clone(),
            video_codec: resolved.params.video_codec.clone(),
            audio_codec: resolved.params.audio_codec.clone(),
            video_bitrate_kbps: resolved.params.video_bitrate,
            audio_bitrate_kbps: resolved.params.audio_bitrate,
            crf: resolved.params.crf,
            preset: resolved.params.preset.clone(),
            size: job.task.size.clone(),
            aspect: job.task.aspect.clone(),
        };

        tracing::debug!(
            hash = %job.hash,
            duration_secs = resolved.metadata.duration_secs,
            params = ?resolved.params,
            "Job resolved"
        );

        job.params = Some(resolved.params);
        job.metadata = Some(resolved.metadata);
        job.state = JobState::Encoding;
        self.state = QueueState::Encoding;

        let ticket = job.ticket;
        let signal_tx = tx.clone();
        let events = EngineEvents::new(move |signal| {
            let _ = signal_tx.send(Command::Engine { ticket, signal });
        });
        let engine = self.ctx.engine.clone();
        let work = tokio::spawn(async move { engine.transcode(&request, &events).await });
        self.in_flight = Some(work.abort_handle());
        tokio::spawn(async move {
            let outcome = work
                .await
                .unwrap_or_else(|e| Err(Error::Engine(format!("engine task ended abnormally: {e}"))));
            let _ = tx.send(Command::Finished { ticket, outcome });
        });
    }

    fn on_engine_signal(&mut self, signal: EngineSignal) {
        let Some(job) = self.active.as_ref() else {
            return;
        };
        match signal {
            EngineSignal::Started => {
                tracing::info!(hash = %job.hash, engine = self.ctx.engine.name(), "Conversion started");
                self.ctx.sink.notify(&ConversionEvent::Started {
                    hash: job.hash.clone(),
                });
            }
            EngineSignal::Progress(progress) => {
                let percent = estimate_percent(
                    job.duration_secs(),
                    &progress.timemark,
                    progress.target_size,
                    self.ctx.config.progress_formula,
                );
                tracing::trace!(hash = %job.hash, percent, timemark = %progress.timemark, "Conversion progress");
                self.ctx.sink.notify(&ConversionEvent::Progress {
                    hash: job.hash.clone(),
                    current_kbps: progress.current_kbps,
                    target_size: progress.target_size,
                    timemark: progress.timemark,
                    percent,
                });
            }
        }
    }

    fn on_finished(&mut self, outcome: Result<()>) {
        let Some(job) = self.active.as_mut() else {
            return;
        };

        match outcome {
            Ok(()) => {
                job.state = JobState::Completed;
                self.completed += 1;
                let url = format!(
                    "{}/converted/{}/{}",
                    self.ctx.public_base_url.trim_end_matches('/'),
                    job.date_dir,
                    job.output_file
                );
                tracing::info!(hash = %job.hash, url = %url, "Conversion completed");

                let metadata = job.metadata.clone().unwrap_or_default();
                self.ctx.sink.notify(&ConversionEvent::Completed {
                    hash: job.hash.clone(),
                    url,
                    output_file: job.output_file.clone(),
                    title: metadata.title.unwrap_or_default(),
                    album: metadata.album.unwrap_or_default(),
                    artist: metadata.artist.unwrap_or_default(),
                });
            }
            Err(e) => {
                job.state = JobState::Failed;
                self.failed += 1;
                let error = e.to_string();
                tracing::error!(hash = %job.hash, error = %error, "Conversion failed");
                self.ctx.sink.notify(&ConversionEvent::Failed {
                    hash: job.hash.clone(),
                    error,
                });
            }
        }

        self.process_next();
    }

    fn on_resolution_failed(&mut self, error: Error) {
        let Some(job) = self.active.as_mut() else {
            return;
        };
        job.state = match error {
            Error::InputNotFound { .. } => JobState::Skipped,
            _ => JobState::Failed,
        };

        if self.ctx.config.fail_closed {
            tracing::error!(
                hash = %job.hash,
                error = %error,
                pending = self.pending.len(),
                "Job could not be prepared; halting queue"
            );
            self.active = None;
            self.in_flight = None;
            self.state = QueueState::Halted;
            self.notify_settled();
            return;
        }

        self.failed += 1;
        let message = error.to_string();
        tracing::warn!(hash = %job.hash, error = %message, state = ?job.state, "Job could not be prepared; skipping");
        self.ctx.sink.notify(&ConversionEvent::Failed {
            hash: job.hash.clone(),
            error: message,
        });
        self.process_next();
    }

    fn is_current(&self, ticket: u64, what: &str) -> bool {
        let current = self.active.as_ref().is_some_and(|job| job.ticket == ticket);
        if !current {
            tracing::warn!(ticket, signal = what, "Dropping signal from inactive job");
        }
        current
    }

    fn is_settled(&self) -> bool {
        matches!(self.state, QueueState::Idle | QueueState::Halted)
    }

    fn notify_settled(&mut self) {
        if self.idle_waiters.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(snapshot.clone());
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            state: self.state,
            active: self.active.as_ref().map(|job| job.hash.clone()),
            pending: self.pending.len(),
            pending_outputs: self.pending.iter().map(|(_, out)| out.clone()).collect(),
            completed: self.completed,
            failed: self.failed,
        }
    }
}

/// Input check, output directory, probe and parameter resolution for one job.
async fn resolve_job(
    extractor: &dyn MetadataExtractor,
    input: &Path,
    output_dir: &Path,
    task: &ConversionTask,
) -> Result<Resolved> {
    if !is_plain_file_name(&task.input_file) {
        return Err(Error::Resolution(format!(
            "input_file '{}' is not a plain file name",
            task.input_file
        )));
    }

    match tokio::fs::try_exists(input).await {
        Ok(true) => {}
        Ok(false) => return Err(Error::input_not_found(input)),
        Err(e) => {
            return Err(Error::Resolution(format!(
                "cannot access input {}: {e}",
                input.display()
            )))
        }
    }

    tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
        Error::Resolution(format!(
            "cannot create output directory {}: {e}",
            output_dir.display()
        ))
    })?;

    let metadata = extractor.extract(input).await.map_err(|e| match e {
        Error::MetadataExtraction { .. } => e,
        other => Error::metadata(input, other.to_string()),
    })?;

    if lookup_format(&task.format).is_none() {
        tracing::warn!(format = %task.format, "Unknown format; using fallback encode parameters");
    }

    Ok(Resolved {
        params: resolve_task(task),
        metadata,
    })
}
