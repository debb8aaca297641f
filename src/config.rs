//! Configuration file discovery.

use std::path::Path;

use anyhow::{Context, Result};
use cq_core::config::Config;

/// Locations searched, in order, when no `--config` is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./convq.toml",
    "~/.config/convq/config.toml",
    "/etc/convq/config.toml",
];

/// Load configuration from a specific file.
pub fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Load from `custom_path`, else the first default location that exists,
/// else built-in defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {}", path.display());
            return load_config(path);
        }
    }

    Ok(Config::default())
}
