//! Encode parameter resolution.
//!
//! Precedence for codecs and base bitrates is task override, then catalog
//! default, then the fallbacks below. Pure and deterministic.

use cq_core::ConversionTask;
use serde::Serialize;

use crate::catalog::{lookup_format, lookup_quality, FormatConfig, QualityPreset};
use crate::naming::extension_for;

pub const FALLBACK_VIDEO_CODEC: &str = "libx264";
pub const FALLBACK_AUDIO_CODEC: &str = "aac";
pub const FALLBACK_VIDEO_BITRATE: u32 = 1200;
pub const FALLBACK_AUDIO_BITRATE: u32 = 320;

/// Final parameters for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEncodeParameters {
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub crf: u8,
    pub preset: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// Also the output extension.
    pub container: String,
}

/// Combine a task with its format entry (if any) and quality preset.
pub fn resolve(
    task: &ConversionTask,
    format: Option<&FormatConfig>,
    quality: &QualityPreset,
) -> ResolvedEncodeParameters {
    let base_video = task
        .video_bitrate
        .or(format.map(|f| f.video_bitrate))
        .unwrap_or(FALLBACK_VIDEO_BITRATE);
    let base_audio = task
        .audio_bitrate
        .or(format.map(|f| f.audio_bitrate))
        .unwrap_or(FALLBACK_AUDIO_BITRATE);

    let video_codec = task
        .video_codec
        .clone()
        .or_else(|| format.map(|f| f.video_codec.to_string()))
        .unwrap_or_else(|| FALLBACK_VIDEO_CODEC.to_string());
    let audio_codec = task
        .audio_codec
        .clone()
        .or_else(|| format.map(|f| f.audio_codec.to_string()))
        .unwrap_or_else(|| FALLBACK_AUDIO_CODEC.to_string());

    ResolvedEncodeParameters {
        video_bitrate: scale(base_video, quality.video_multiplier),
        audio_bitrate: scale(base_audio, quality.audio_multiplier),
        crf: quality.crf,
        preset: quality.preset.to_string(),
        video_codec,
        audio_codec,
        container: extension_for(&task.format),
    }
}

/// [`resolve`] using the built-in catalog.
pub fn resolve_task(task: &ConversionTask) -> ResolvedEncodeParameters {
    resolve(task, lookup_format(&task.format), lookup_quality(task.quality))
}

fn scale(base: u32, multiplier: f64) -> u32 {
    let scaled = (f64::from(base) * multiplier).round();
    if scaled <= 0.0 {
        0
    } else if scaled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        scaled as u32
    }
}
