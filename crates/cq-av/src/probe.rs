//! Input metadata extraction.
//!
//! [`FfprobeExtractor`] shells out to
//! `ffprobe -v quiet -print_format json -show_format -show_streams` and maps
//! the JSON into [`MediaMetadata`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use cq_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Probe timeout; ffprobe reads headers only.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// What the queue needs to know about an input before encoding it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_secs: f64,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
}

/// Source of duration and descriptive tags for an input file.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    async fn extract(&self, path: &Path) -> Result<MediaMetadata>;
}

/// An extractor backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeExtractor {
    ffprobe_path: PathBuf,
}

impl FfprobeExtractor {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }
}

#[async_trait]
impl MetadataExtractor for FfprobeExtractor {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn extract(&self, path: &Path) -> Result<MediaMetadata> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(PROBE_TIMEOUT);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());

        let output = cmd
            .execute()
            .await
            .map_err(|e| Error::metadata(path, e.to_string()))?;
        parse_ffprobe_output(path, &output.stdout)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Map raw ffprobe JSON into [`MediaMetadata`].
///
/// Duration comes from the container, or the longest stream when the
/// container omits it. Tag names are matched case-insensitively; container
/// tags win over stream tags.
pub fn parse_ffprobe_output(path: &Path, json: &str) -> Result<MediaMetadata> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::metadata(path, format!("ffprobe JSON parse error: {e}")))?;

    let format_duration = ff
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds);
    let duration_secs = format_duration
        .or_else(|| {
            ff.streams
                .iter()
                .filter_map(|s| s.duration.as_deref().and_then(parse_seconds))
                .reduce(f64::max)
        })
        .ok_or_else(|| Error::metadata(path, "no duration reported"))?;

    let tag = |name: &str| -> Option<String> {
        let from_format = ff.format.as_ref().and_then(|f| find_tag(&f.tags, name));
        from_format.or_else(|| ff.streams.iter().find_map(|s| find_tag(&s.tags, name)))
    };

    Ok(MediaMetadata {
        duration_secs,
        title: tag("title"),
        album: tag("album"),
        artist: tag("artist"),
    })
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
}

fn find_tag(tags: &HashMap<String, String>, name: &str) -> Option<String> {
    tags.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
