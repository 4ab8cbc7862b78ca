//! Create a mirror configuration file

use crate::util;
use anyhow::{bail, Context, Result};
use mirra_core::{ConfigError, MirrorConfig};
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub async fn run(
    source: PathBuf,
    destination: PathBuf,
    config_path: Option<PathBuf>,
    exclude: Vec<String>,
    force: bool,
) -> Result<()> {
    let config_path = util::resolve_config_path(config_path)?;
    if config_path.exists() && !force {
        bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }

    let mut config = MirrorConfig::new(source, destination);
    config.exclude = exclude;

    // A missing source is allowed at init time (the tree may not exist
    // yet); `run` enforces it. Everything else is refused here.
    match config.validate() {
        Ok(()) => {}
        Err(e @ ConfigError::SourceMissing(_)) | Err(e @ ConfigError::SourceNotDirectory(_)) => {
            println!("{} {}", "Note:".yellow(), e);
        }
        Err(e) => return Err(e).context("Refusing to write an invalid configuration"),
    }

    config
        .save(&config_path)
        .context("Failed to write configuration")?;

    println!("{} Created {}", "✓".green(), config_path.display());
    println!("  {} = {}", "Source".cyan(), config.source.display());
    println!("  {} = {}", "Destination".cyan(), config.destination.display());
    if !config.exclude.is_empty() {
        println!("  {} = {}", "Exclude".cyan(), config.exclude.join(", "));
    }
    println!();
    println!("Start mirroring with 'mirra run'");
    Ok(())
}
