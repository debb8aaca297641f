//! Transcoding engine abstraction and the ffmpeg implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cq_core::{Error, Result};

use crate::command::ToolCommand;
use crate::progress::{EncodeProgress, ProgressParser};

/// Encodes can run for hours on large inputs.
const ENCODE_TIMEOUT: Duration = Duration::from_secs(86400);

/// Video codec value meaning "do not re-encode".
const PASSTHROUGH: &str = "copy";

/// Encoders that take a constant-rate-factor.
const CRF_ENCODERS: &[&str] = &["libx264", "libx265", "libvpx-vp9", "libaom-av1", "libsvtav1"];

/// Encoders that take a named `-preset`.
const PRESET_ENCODERS: &[&str] = &["libx264", "libx265"];

/// Containers that carry audio only.
const AUDIO_ONLY_CONTAINERS: &[&str] = &["mp3", "m4a", "aac", "ogg", "opus", "flac", "wav"];

/// Fully resolved parameters for one encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Container identifier, e.g. `mp4`, `mkv`, `mp3`.
    pub container: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate_kbps: u32,
    /// 0 leaves the bitrate to the codec.
    pub audio_bitrate_kbps: u32,
    pub crf: u8,
    pub preset: String,
    pub size: Option<String>,
    pub aspect: Option<String>,
}

/// Lifecycle signal from a running engine. The terminal outcome is the
/// return value of [`TranscodeEngine::transcode`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    Started,
    Progress(EncodeProgress),
}

/// Callback handle passed to an engine for reporting [`EngineSignal`]s.
#[derive(Clone)]
pub struct EngineEvents {
    emit: Arc<dyn Fn(EngineSignal) + Send + Sync>,
}

impl EngineEvents {
    pub fn new(emit: impl Fn(EngineSignal) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    /// Handle that discards every signal.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn started(&self) {
        (self.emit)(EngineSignal::Started);
    }

    pub fn progress(&self, progress: EncodeProgress) {
        (self.emit)(EngineSignal::Progress(progress));
    }
}

impl std::fmt::Debug for EngineEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEvents").finish_non_exhaustive()
    }
}

/// A transcoding backend.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one encode to completion, reporting start and progress through
    /// `events`. `Ok` means the output was written.
    async fn transcode(&self, request: &EncodeRequest, events: &EngineEvents) -> Result<()>;
}

/// [`TranscodeEngine`] that spawns ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_path: PathBuf,
    hw_accel: Option<String>,
}

impl FfmpegEngine {
    pub fn new(ffmpeg_path: PathBuf, hw_accel: Option<String>) -> Self {
        Self {
            ffmpeg_path,
            hw_accel,
        }
    }

    /// Build the full ffmpeg argument list for `req`.
    pub fn build_args(&self, req: &EncodeRequest) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-y", "-nostats", "-progress", "pipe:2"]
            .into_iter()
            .map(String::from)
            .collect();

        // Hardware decode flags must appear before -i.
        args.extend(resolve_hw_accel(self.hw_accel.as_deref()).iter().map(|s| s.to_string()));
        args.push("-i".into());
        args.push(req.input.to_string_lossy().into_owned());

        if is_audio_only_container(&req.container) {
            args.push("-vn".into());
        } else if req.video_codec == PASSTHROUGH {
            args.extend(["-c:v".into(), PASSTHROUGH.into()]);
        } else {
            args.extend(["-c:v".into(), req.video_codec.clone()]);
            args.extend(["-b:v".into(), format!("{}k", req.video_bitrate_kbps)]);
            if CRF_ENCODERS.contains(&req.video_codec.as_str()) {
                args.extend(["-crf".into(), req.crf.to_string()]);
            }
            if PRESET_ENCODERS.contains(&req.video_codec.as_str()) {
                args.extend(["-preset".into(), req.preset.clone()]);
            }
            if let Some(size) = req.size.as_deref() {
                args.extend(size_args(size));
            }
            if let Some(aspect) = req.aspect.as_deref() {
                args.extend(["-aspect".into(), aspect.to_string()]);
            }
        }

        args.extend(["-c:a".into(), req.audio_codec.clone()]);
        if req.audio_bitrate_kbps > 0 {
            args.extend(["-b:a".into(), format!("{}k", req.audio_bitrate_kbps)]);
        }

        if matches!(req.container.as_str(), "mp4" | "mov" | "m4a") {
            args.extend(["-movflags".into(), "+faststart".into()]);
        }
        if let Some(muxer) = muxer_for(&req.container) {
            args.extend(["-f".into(), muxer.into()]);
        }

        args.push(req.output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn transcode(&self, request: &EncodeRequest, events: &EngineEvents) -> Result<()> {
        tracing::info!(
            input = %request.input.display(),
            output = %request.output.display(),
            container = %request.container,
            video_codec = %request.video_codec,
            audio_codec = %request.audio_codec,
            hw_accel = ?self.hw_accel,
            "starting ffmpeg encode"
        );

        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.timeout(ENCODE_TIMEOUT);
        cmd.args(self.build_args(request));

        let mut parser = ProgressParser::new();
        let output = cmd
            .execute_streaming(
                || events.started(),
                |line| {
                    if let Some(progress) = parser.feed(line) {
                        events.progress(progress);
                    }
                },
            )
            .await
            .map_err(|e| Error::Engine(e.to_string()))?;

        if output.status.success() {
            return Ok(());
        }

        let reason = parser
            .failure_reason()
            .unwrap_or_else(|| format!("exited with status {}", output.status));
        Err(Error::Engine(format!("ffmpeg failed: {reason}")))
    }
}

/// Whether `container` holds audio only.
pub fn is_audio_only_container(container: &str) -> bool {
    AUDIO_ONLY_CONTAINERS.contains(&container)
}

/// ffmpeg hardware decode flags for the configured acceleration method.
fn resolve_hw_accel(hw_accel: Option<&str>) -> &'static [&'static str] {
    match hw_accel {
        Some("videotoolbox") => &["-hwaccel", "videotoolbox"],
        Some("nvenc") => &["-hwaccel", "cuda"],
        Some("vaapi") => &["-hwaccel", "vaapi"],
        Some("qsv") => &["-hwaccel", "qsv"],
        _ => &[],
    }
}

/// `WxH` maps to `-s`; a `?` side keeps the aspect via the scale filter.
fn size_args(size: &str) -> Vec<String> {
    match size.split_once('x') {
        Some((w, "?")) if w != "?" => vec!["-vf".into(), format!("scale={w}:-2")],
        Some(("?", h)) if h != "?" => vec!["-vf".into(), format!("scale=-2:{h}")],
        _ => vec!["-s".into(), size.to_string()],
    }
}

/// Explicit muxer so the output does not depend on extension sniffing.
fn muxer_for(container: &str) -> Option<&'static str> {
    Some(match container {
        "mp4" => "mp4",
        "mkv" => "matroska",
        "mov" => "mov",
        "webm" => "webm",
        "avi" => "avi",
        "flv" => "flv",
        "mp3" => "mp3",
        "m4a" => "ipod",
        "aac" => "adts",
        "ogg" => "ogg",
        "opus" => "opus",
        "flac" => "flac",
        "wav" => "wav",
        _ => return None,
    })
}
