//! Conversion task model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Named quality tier mapping to bitrate multipliers and encoder effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Low,
    Medium,
    High,
    Ultra,
}

impl QualityLevel {
    /// All levels, lowest first.
    pub const ALL: [QualityLevel; 4] = [
        QualityLevel::Low,
        QualityLevel::Medium,
        QualityLevel::High,
        QualityLevel::Ultra,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Low => "low",
            QualityLevel::Medium => "medium",
            QualityLevel::High => "high",
            QualityLevel::Ultra => "ultra",
        }
    }
}

impl Default for QualityLevel {
    fn default() -> Self {
        QualityLevel::Medium
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityLevel::Low),
            "medium" => Ok(QualityLevel::Medium),
            "high" => Ok(QualityLevel::High),
            "ultra" => Ok(QualityLevel::Ultra),
            other => Err(Error::Validation(format!(
                "unknown quality level '{other}' (expected low, medium, high or ultra)"
            ))),
        }
    }
}

/// A single requested conversion.
///
/// Immutable once enqueued. Field aliases accept the camelCase payloads
/// produced by the listener side (`inputFile`, `videoBitrate`, `codec`).
/// Bitrates are in kbps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionTask {
    /// File name relative to `<base_dir>/tmp`.
    #[serde(alias = "inputFile")]
    pub input_file: String,
    /// Target format identifier, e.g. `mp4` or `mp4-hq`.
    pub format: String,
    /// Explicit output size (`1280x720`, `640x?`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Explicit display aspect (`16:9`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityLevel>,
    #[serde(
        default,
        alias = "videoCodec",
        alias = "codec",
        skip_serializing_if = "Option::is_none"
    )]
    pub video_codec: Option<String>,
    #[serde(default, alias = "audioCodec", skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(default, alias = "videoBitrate", skip_serializing_if = "Option::is_none")]
    pub video_bitrate: Option<u32>,
    #[serde(default, alias = "audioBitrate", skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<u32>,
}

impl ConversionTask {
    /// Create a task with only the required fields set.
    pub fn new(input_file: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            input_file: input_file.into(),
            format: format.into(),
            size: None,
            aspect: None,
            quality: None,
            video_codec: None,
            audio_codec: None,
            video_bitrate: None,
            audio_bitrate: None,
        }
    }

    #[must_use]
    pub fn with_quality(mut self, quality: QualityLevel) -> Self {
        self.quality = Some(quality);
        self
    }

    #[must_use]
    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = Some(codec.into());
        self
    }

    #[must_use]
    pub fn with_audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = Some(codec.into());
        self
    }

    #[must_use]
    pub fn with_video_bitrate(mut self, kbps: u32) -> Self {
        self.video_bitrate = Some(kbps);
        self
    }

    #[must_use]
    pub fn with_audio_bitrate(mut self, kbps: u32) -> Self {
        self.audio_bitrate = Some(kbps);
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    #[must_use]
    pub fn with_aspect(mut self, aspect: impl Into<String>) -> Self {
        self.aspect = Some(aspect.into());
        self
    }

    /// Check the required fields. Used at the HTTP and CLI boundaries; the
    /// queue itself accepts any task and reports problems through
    /// notifications.
    pub fn validate(&self) -> Result<()> {
        if self.input_file.trim().is_empty() {
            return Err(Error::Validation("input_file is required".into()));
        }
        if !is_plain_file_name(&self.input_file) {
            return Err(Error::Validation(format!(
                "input_file '{}' must be a plain file name inside the upload directory",
                self.input_file
            )));
        }
        if self.format.trim().is_empty() {
            return Err(Error::Validation("format is required".into()));
        }
        Ok(())
    }
}

/// Whether `name` is a single file name: no separators, no `.`/`..`, not
/// absolute.
pub fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
