use clap::{Parser, Subcommand};
use cq_core::QualityLevel;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "convq")]
#[command(author, version, about = "Single-slot media conversion queue")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP service and conversion queue
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Queue one or more files and wait for them to finish
    Convert {
        /// Input file names, relative to `<base_dir>/tmp`
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Target format (see `convq formats`)
        #[arg(short, long)]
        format: String,

        /// Quality level
        #[arg(short, long)]
        quality: Option<QualityLevel>,

        /// Output size, e.g. `1280x?`
        #[arg(long)]
        size: Option<String>,

        /// Display aspect ratio, e.g. `16:9`
        #[arg(long)]
        aspect: Option<String>,

        /// Video codec override
        #[arg(long)]
        video_codec: Option<String>,

        /// Audio codec override
        #[arg(long)]
        audio_codec: Option<String>,

        /// Video bitrate override in kbps
        #[arg(long)]
        video_bitrate: Option<u32>,

        /// Audio bitrate override in kbps
        #[arg(long)]
        audio_bitrate: Option<u32>,

        /// Base directory (overrides config)
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Stop at the first failure
        #[arg(long)]
        fail_closed: bool,
    },

    /// List output formats and quality presets
    Formats,

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
