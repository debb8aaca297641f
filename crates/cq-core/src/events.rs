//! Conversion lifecycle events and notification sinks.
//!
//! [`ConversionEvent`] is the notification contract emitted by the queue.
//! Anything that wants to observe the queue implements [`NotificationSink`].
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late-joining clients can catch up.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::task::ConversionTask;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// ConversionEvent
// ---------------------------------------------------------------------------

/// Lifecycle notification for a single job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversionEvent {
    Queued {
        output_file: String,
        task: ConversionTask,
    },
    Started {
        hash: String,
    },
    Progress {
        hash: String,
        /// Current encoder output bitrate in kbps, when ffmpeg reports one.
        current_kbps: Option<f64>,
        /// Bytes written so far.
        target_size: u64,
        timemark: String,
        percent: u8,
    },
    Failed {
        hash: String,
        error: String,
    },
    Completed {
        hash: String,
        url: String,
        output_file: String,
        title: String,
        album: String,
        artist: String,
    },
}

impl ConversionEvent {
    /// Short lowercase name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionEvent::Queued { .. } => "queued",
            ConversionEvent::Started { .. } => "started",
            ConversionEvent::Progress { .. } => "progress",
            ConversionEvent::Failed { .. } => "failed",
            ConversionEvent::Completed { .. } => "completed",
        }
    }

    /// Job hash, absent only for `queued`.
    pub fn hash(&self) -> Option<&str> {
        match self {
            ConversionEvent::Queued { .. } => None,
            ConversionEvent::Started { hash }
            | ConversionEvent::Progress { hash, .. }
            | ConversionEvent::Failed { hash, .. }
            | ConversionEvent::Completed { hash, .. } => Some(hash),
        }
    }

    /// Whether this event ends a job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversionEvent::Failed { .. } | ConversionEvent::Completed { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// NotificationSink
// ---------------------------------------------------------------------------

/// Receiver of lifecycle events.
///
/// Implementations must not block: the queue calls `notify` from its actor
/// loop. Delivery failures are the sink's concern and never propagate back.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &ConversionEvent);
}

/// Forwards every event to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanOut {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NotificationSink for FanOut {
    fn notify(&self, event: &ConversionEvent) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: ConversionEvent,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: ConversionEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: ConversionEvent) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationSink for EventBus {
    fn notify(&self, event: &ConversionEvent) {
        self.broadcast(event.clone());
    }
}
