//! Parser for ffmpeg `-progress pipe:2` output.
//!
//! ffmpeg writes one `key=value` pair per line and closes every block with a
//! `progress=continue` or `progress=end` line. Anything else on stderr is a
//! diagnostic and is retained so a failed encode can be explained.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Diagnostic lines kept for error reporting.
const MAX_DIAGNOSTIC_LINES: usize = 8;

/// Keys ffmpeg emits inside a progress block.
const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

/// One progress sample from a running encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// Current output bitrate in kbps. `None` while ffmpeg reports `N/A`.
    pub current_kbps: Option<f64>,
    /// Bytes written to the output so far.
    pub target_size: u64,
    /// Elapsed media time as `HH:MM:SS.micro`.
    pub timemark: String,
}

/// Incremental, line-fed parser.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current_kbps: Option<f64>,
    total_size: u64,
    out_time: Option<String>,
    diagnostics: VecDeque<String>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stderr line; returns a sample when a block completes.
    pub fn feed(&mut self, line: &str) -> Option<EncodeProgress> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some((key, value)) = line.split_once('=').filter(|(k, _)| is_progress_key(k)) else {
            self.push_diagnostic(line);
            return None;
        };
        let value = value.trim();

        match key {
            "bitrate" => self.current_kbps = parse_kbps(value),
            "total_size" => self.total_size = value.parse().unwrap_or(self.total_size),
            "out_time" => {
                if value != "N/A" {
                    self.out_time = Some(value.to_string());
                }
            }
            "progress" => {
                let timemark = self.out_time.clone()?;
                return Some(EncodeProgress {
                    current_kbps: self.current_kbps,
                    target_size: self.total_size,
                    timemark,
                });
            }
            _ => {}
        }
        None
    }

    /// Recent non-progress lines, oldest first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &str> {
        self.diagnostics.iter().map(String::as_str)
    }

    /// Best-effort failure description from the retained diagnostics.
    pub fn failure_reason(&self) -> Option<String> {
        if self.diagnostics.is_empty() {
            None
        } else {
            Some(self.diagnostics().collect::<Vec<_>>().join("; "))
        }
    }

    fn push_diagnostic(&mut self, line: &str) {
        if self.diagnostics.len() == MAX_DIAGNOSTIC_LINES {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(line.to_string());
    }
}

fn is_progress_key(key: &str) -> bool {
    PROGRESS_KEYS.contains(&key) || key.starts_with("stream_")
}

/// `"1534.2kbits/s"` -> `Some(1534.2)`; `"N/A"` -> `None`.
fn parse_kbps(value: &str) -> Option<f64> {
    value
        .strip_suffix("kbits/s")
        .unwrap_or(value)
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
