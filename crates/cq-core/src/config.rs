//! Service configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML. Every section
//! defaults sensibly so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub tools: ToolsConfig,
    pub encoding: EncodingConfig,
    pub notifications: NotificationConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Read and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.queue.base_dir.as_os_str().is_empty() {
            warnings.push("queue.base_dir is empty; the current directory will be used".into());
        }

        if let Some(ref hw) = self.encoding.hw_accel {
            let valid = ["none", "videotoolbox", "nvenc", "vaapi", "qsv"];
            if !valid.contains(&hw.as_str()) {
                warnings.push(format!(
                    "encoding.hw_accel '{}' is not a recognized method (valid: {})",
                    hw,
                    valid.join(", ")
                ));
            }
        }

        if let Some(ref url) = self.notifications.listener_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(format!(
                    "notifications.listener_url '{url}' should start with http:// or https://"
                ));
            }
        }

        if self.notifications.timeout_secs == 0 {
            warnings.push("notifications.timeout_secs is 0; requests will time out immediately".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Host advertised in completion URLs. Discovered when unset.
    pub public_host: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            public_host: None,
        }
    }
}

/// How progress percentages are derived from ffmpeg timemarks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressFormula {
    /// Historical `minutes.seconds` over a duration-derived window.
    Legacy,
    /// Elapsed seconds over total duration.
    #[default]
    Ratio,
}

/// Queue behaviour and working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Holds `tmp/` (inputs) and `converted/` (outputs).
    pub base_dir: PathBuf,
    /// Halt the queue on a resolution failure instead of skipping the job.
    pub fail_closed: bool,
    pub progress_formula: ProgressFormula,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            fail_closed: false,
            progress_formula: ProgressFormula::default(),
        }
    }
}

impl QueueConfig {
    pub fn input_dir(&self) -> PathBuf {
        self.base_dir.join("tmp")
    }

    pub fn converted_dir(&self) -> PathBuf {
        self.base_dir.join("converted")
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Encoder settings shared by all jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Hardware acceleration method (none, videotoolbox, nvenc, vaapi, qsv).
    pub hw_accel: Option<String>,
}

/// External listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Base URL receiving `/queue`, `/start`, `/progress`, `/error` and
    /// `/complete` posts. Notifications stay in-process when unset.
    pub listener_url: Option<String>,
    #[serde(default = "default_notification_timeout")]
    pub timeout_secs: u64,
}

fn default_notification_timeout() -> u64 {
    10
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            listener_url: None,
            timeout_secs: default_notification_timeout(),
        }
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
