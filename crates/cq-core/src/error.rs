//! Unified error type for convq.
//!
//! Every crate funnels its failures into [`Error`]. Queue failures never reach
//! the submitter; they are logged and reported through the notification sink.
//! The HTTP layer derives a status code via [`Error::http_status`].

use std::path::{Path, PathBuf};

/// Unified error type covering all failure modes in convq.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The task's input file does not exist under the working directory.
    #[error("input not found: {}", path.display())]
    InputNotFound {
        /// The resolved input location.
        path: PathBuf,
    },

    /// Duration/tag extraction failed for the input file.
    #[error("metadata extraction failed for {}: {message}", path.display())]
    MetadataExtraction {
        /// The file being inspected.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// The transcoding engine reported a failure.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Setting up a job failed before the engine was invoked.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// An external tool (ffmpeg, ffprobe) could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The configuration could not be read or parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InputNotFound { .. } => 404,
            Error::MetadataExtraction { .. } => 422,
            Error::Engine(_) => 502,
            Error::Resolution(_) => 500,
            Error::Tool { .. } => 502,
            Error::Io { .. } => 500,
            Error::Config(_) => 500,
            Error::Validation(_) => 400,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::InputNotFound`].
    pub fn input_not_found(path: impl Into<PathBuf>) -> Self {
        Error::InputNotFound { path: path.into() }
    }

    /// Convenience constructor for [`Error::MetadataExtraction`].
    pub fn metadata(path: &Path, message: impl Into<String>) -> Self {
        Error::MetadataExtraction {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
