//! Runtime view of a task while the queue is working on it.

use std::path::PathBuf;

use cq_av::MediaMetadata;
use cq_core::ConversionTask;
use serde::{Deserialize, Serialize};

use crate::resolver::ResolvedEncodeParameters;

/// Per-job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Checking the input, creating the output directory, probing.
    Resolving,
    /// The engine owns the job.
    Encoding,
    Completed,
    Failed,
    /// Input was missing.
    Skipped,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Skipped)
    }
}

/// The active job. Owned by the queue actor.
#[derive(Debug, Clone)]
pub struct Job {
    /// Monotonic per-queue sequence number; signals carrying another
    /// ticket are stale.
    pub ticket: u64,
    pub task: ConversionTask,
    pub hash: String,
    pub output_file: String,
    /// `YYYY-M-D` directory under `converted/`.
    pub date_dir: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub state: JobState,
    pub params: Option<ResolvedEncodeParameters>,
    pub metadata: Option<MediaMetadata>,
}

impl Job {
    /// Duration used for progress estimation; 0 until probed.
    pub fn duration_secs(&self) -> f64 {
        self.metadata.as_ref().map_or(0.0, |m| m.duration_secs)
    }
}
