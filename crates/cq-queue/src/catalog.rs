//! Static format and quality lookup tables.

use cq_core::QualityLevel;
use serde::Serialize;

/// Video codec value for audio-only formats.
pub const PASSTHROUGH: &str = "copy";

/// Default codecs and bitrates for one output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatConfig {
    pub id: &'static str,
    pub video_codec: &'static str,
    pub audio_codec: &'static str,
    /// kbps; ignored for passthrough video.
    pub video_bitrate: u32,
    /// kbps; 0 leaves the bitrate to the codec (lossless formats).
    pub audio_bitrate: u32,
}

impl FormatConfig {
    pub fn is_audio_only(&self) -> bool {
        self.video_codec == PASSTHROUGH
    }
}

/// Bitrate multipliers and encoder effort for one quality level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityPreset {
    pub level: QualityLevel,
    pub video_multiplier: f64,
    pub audio_multiplier: f64,
    /// Encoder effort (`-preset`).
    pub preset: &'static str,
    /// Constant rate factor, lower is better.
    pub crf: u8,
}

const fn entry(
    id: &'static str,
    video_codec: &'static str,
    audio_codec: &'static str,
    video_bitrate: u32,
    audio_bitrate: u32,
) -> FormatConfig {
    FormatConfig {
        id,
        video_codec,
        audio_codec,
        video_bitrate,
        audio_bitrate,
    }
}

static FORMATS: &[FormatConfig] = &[
    entry("mp4", "libx264", "aac", 1200, 128),
    entry("mp4-hq", "libx264", "aac", 4000, 192),
    entry("mkv", "libx264", "aac", 2000, 192),
    entry("mov", "libx264", "aac", 2500, 192),
    entry("webm", "libvpx-vp9", "libopus", 1000, 128),
    entry("avi", "mpeg4", "libmp3lame", 1500, 192),
    entry("flv", "libx264", "aac", 800, 128),
    entry("mp3", PASSTHROUGH, "libmp3lame", 0, 192),
    entry("m4a", PASSTHROUGH, "aac", 0, 192),
    entry("aac", PASSTHROUGH, "aac", 0, 192),
    entry("ogg", PASSTHROUGH, "libvorbis", 0, 192),
    entry("opus", PASSTHROUGH, "libopus", 0, 128),
    entry("flac", PASSTHROUGH, "flac", 0, 0),
    entry("wav", PASSTHROUGH, "pcm_s16le", 0, 0),
];

static QUALITY: [QualityPreset; 4] = [
    QualityPreset {
        level: QualityLevel::Low,
        video_multiplier: 0.5,
        audio_multiplier: 0.5,
        preset: "veryfast",
        crf: 28,
    },
    QualityPreset {
        level: QualityLevel::Medium,
        video_multiplier: 1.0,
        audio_multiplier: 1.0,
        preset: "medium",
        crf: 23,
    },
    QualityPreset {
        level: QualityLevel::High,
        video_multiplier: 1.5,
        audio_multiplier: 1.0,
        preset: "slow",
        crf: 20,
    },
    QualityPreset {
        level: QualityLevel::Ultra,
        video_multiplier: 2.0,
        audio_multiplier: 1.25,
        preset: "veryslow",
        crf: 18,
    },
];

/// Find a format by identifier, ignoring ASCII case.
pub fn lookup_format(id: &str) -> Option<&'static FormatConfig> {
    let id = id.trim();
    FORMATS.iter().find(|f| f.id.eq_ignore_ascii_case(id))
}

/// Preset for `level`; unset means medium.
pub fn lookup_quality(level: Option<QualityLevel>) -> &'static QualityPreset {
    let level = level.unwrap_or_default();
    match level {
        QualityLevel::Low => &QUALITY[0],
        QualityLevel::Medium => &QUALITY[1],
        QualityLevel::High => &QUALITY[2],
        QualityLevel::Ultra => &QUALITY[3],
    }
}

/// Every catalog entry, in table order.
pub fn formats() -> &'static [FormatConfig] {
    FORMATS
}

/// Every quality preset, lowest first.
pub fn qualities() -> &'static [QualityPreset] {
    &QUALITY
}
