//! Show the active mirror configuration

use crate::util;
use anyhow::{Context, Result};
use mirra_core::MirrorConfig;
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config_path = util::resolve_config_path(config_path)?;

    if !config_path.exists() {
        println!("{}", config_path.display());
        println!(
            "{}",
            "File does not exist. Create one with 'mirra init'.".yellow()
        );
        std::process::exit(1);
    }

    let config = MirrorConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    println!("{}", "Mirror Configuration".bold());
    println!("{} {}", "Location:".dimmed(), config_path.display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("Failed to render configuration")?
    );
    Ok(())
}
