//! Shared CLI helpers

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Default configuration file under the platform config directory
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .context("Could not determine the user configuration directory")?;
    Ok(base.join("mirra").join("config.json"))
}

/// Resolve an explicit `--config` override against the default location
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
}
