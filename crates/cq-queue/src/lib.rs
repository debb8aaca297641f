//! cq-queue: the conversion queue.
//!
//! Lookup tables ([`catalog`]), pure parameter and naming helpers
//! ([`resolver`], [`naming`], [`progress`]) and the [`QueueManager`] actor
//! that serializes jobs against one transcoding slot.

pub mod catalog;
pub mod job;
pub mod manager;
pub mod naming;
pub mod progress;
pub mod resolver;

pub use catalog::{formats, lookup_format, lookup_quality, qualities, FormatConfig, QualityPreset};
pub use job::{Job, JobState};
pub use manager::{QueueContext, QueueHandle, QueueManager, QueueSnapshot, QueueState};
pub use naming::{dated_dir_name, input_hash, output_file_name};
pub use progress::estimate_percent;
pub use resolver::{resolve, resolve_task, ResolvedEncodeParameters};
