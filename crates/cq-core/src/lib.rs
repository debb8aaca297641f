//! cq-core: shared types, errors, configuration, and lifecycle events.
//!
//! This crate is the foundational dependency for the other cq-* crates. It
//! provides the conversion task model, a unified error type, the TOML
//! configuration, and the notification contract the queue manager reports
//! through.

pub mod config;
pub mod error;
pub mod events;
pub mod task;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use events::{ConversionEvent, Event, EventBus, FanOut, NotificationSink};
pub use task::{is_plain_file_name, ConversionTask, QualityLevel};
