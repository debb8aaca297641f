//! # cq-av
//!
//! ffmpeg/ffprobe integration for the conversion queue.
//!
//! - **Tool discovery** ([`ToolRegistry`]) finds ffmpeg and ffprobe.
//! - **Command execution** ([`ToolCommand`]) is an async builder with timeout
//!   support and line-streamed stderr.
//! - **Metadata** ([`FfprobeExtractor`]) implements [`MetadataExtractor`].
//! - **Transcoding** ([`FfmpegEngine`]) implements [`TranscodeEngine`] and
//!   reports start/progress through [`EngineEvents`].

pub mod command;
pub mod engine;
pub mod probe;
pub mod progress;
pub mod tools;

pub use command::{ToolCommand, ToolOutput};
pub use engine::{
    is_audio_only_container, EncodeRequest, EngineEvents, EngineSignal, FfmpegEngine,
    TranscodeEngine,
};
pub use probe::{FfprobeExtractor, MediaMetadata, MetadataExtractor};
pub use progress::{EncodeProgress, ProgressParser};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
