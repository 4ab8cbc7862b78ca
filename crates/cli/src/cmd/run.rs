//! Run the mirror until the user asks it to stop

use crate::util;
use anyhow::{Context, Result};
use mirra_core::MirrorConfig;
use mirra_engine::MirrorController;
use owo_colors::OwoColorize;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

pub async fn run(
    config_path: Option<PathBuf>,
    resync_interval: u64,
    skip_initial_sync: bool,
) -> Result<()> {
    let config_path = util::resolve_config_path(config_path)?;
    let config = MirrorConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    println!(
        "{} {} {} {}",
        "Mirroring".bold(),
        config.source.display(),
        "->".dimmed(),
        config.destination.display()
    );

    let mut controller = MirrorController::new(config)
        .resync_interval(Duration::from_secs(resync_interval))
        .skip_initial_sync(skip_initial_sync);
    controller.start().await?;

    println!("Press 'q' then Enter (or Ctrl-C) to stop");
    wait_for_stop().await;

    let stats = controller.stop().await?;
    println!();
    println!("{} Mirror stopped", "✓".green());
    println!("  Operations applied: {}", stats.ops_applied);
    if stats.ops_failed > 0 {
        println!("  Operations failed: {}", stats.ops_failed.red());
    }
    if stats.events_dropped > 0 {
        println!("  Events dropped: {}", stats.events_dropped.yellow());
    }
    Ok(())
}

/// Resolves when either 'q' arrives on stdin or Ctrl-C is received.
///
/// The sentinel reader lives on a plain detached thread: a stdin read
/// still blocked at shutdown must not hold the runtime open, and the
/// blocking pool is joined when the runtime drops. Stdin reaching EOF
/// does not stop the mirror, so a detached run keeps going until it
/// gets a signal.
async fn wait_for_stop() {
    let (quit_tx, mut quit_rx) = mpsc::channel::<()>(1);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            match lines.next() {
                Some(Ok(line)) if line.trim().eq_ignore_ascii_case("q") => {
                    let _ = quit_tx.blocking_send(());
                    return;
                }
                Some(Ok(_)) => continue,
                // EOF or a read error means nobody is typing commands;
                // only a signal stops the mirror from here on.
                Some(Err(_)) | None => {
                    tracing::debug!("stdin closed without a quit sentinel");
                    return;
                }
            }
        }
    });

    tokio::select! {
        Some(()) = quit_rx.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
