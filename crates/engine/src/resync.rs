//! Drift repair between live events
//!
//! Walks both trees and produces synthetic change events for anything
//! the live feed missed: entries the destination lacks or holds stale,
//! and orphans the source no longer has. Synthetic events go through
//! the same classify/apply pipeline as live ones, so resync inherits
//! its idempotence and ordering. The first pass at startup doubles as
//! the initial sync.

use mirra_core::MirrorPaths;
use mirra_watcher::{ChangeEvent, ChangeKind, ExcludeRules};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default seconds between reconciliation passes
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Compare both trees and collect synthetic events for the divergence
///
/// Pure scan; no destination mutation happens here. Missing and stale
/// entries surface as `Created`, orphans as `Deleted` carrying the
/// source-side path the entry would have had.
pub fn scan(paths: &MirrorPaths, excludes: &ExcludeRules) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    scan_source(paths, excludes, &mut events);
    scan_orphans(paths, excludes, &mut events);
    events
}

fn scan_source(paths: &MirrorPaths, excludes: &ExcludeRules, events: &mut Vec<ChangeEvent>) {
    let mut walker = WalkDir::new(paths.source_root()).min_depth(1).into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("resync source scan: {}", e);
                continue;
            }
        };
        let relative = match paths.relative(entry.path()) {
            Some(relative) => relative.to_path_buf(),
            None => continue,
        };
        let file_type = entry.file_type();

        if excludes.is_excluded(&relative, file_type.is_dir()) {
            if file_type.is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        if file_type.is_dir() {
            if !paths.dest_for_relative(&relative).is_dir() {
                events.push(ChangeEvent {
                    kind: ChangeKind::Created,
                    path: entry.into_path(),
                    is_dir: Some(true),
                });
                // The tree copy covers everything underneath.
                walker.skip_current_dir();
            }
        } else if file_type.is_file() {
            if needs_copy(entry.path(), &paths.dest_for_relative(&relative)) {
                events.push(ChangeEvent {
                    kind: ChangeKind::Created,
                    path: entry.into_path(),
                    is_dir: Some(false),
                });
            }
        } else {
            debug!("resync skips unsupported entry {}", entry.path().display());
        }
    }
}

fn scan_orphans(paths: &MirrorPaths, excludes: &ExcludeRules, events: &mut Vec<ChangeEvent>) {
    let mut walker = WalkDir::new(paths.dest_root()).min_depth(1).into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("resync orphan scan: {}", e);
                continue;
            }
        };
        let relative = match paths.relative_in_dest(entry.path()) {
            Some(relative) => relative.to_path_buf(),
            None => continue,
        };
        let is_dir = entry.file_type().is_dir();

        // Excluded paths are left alone: the source may legitimately
        // hold an entry there that is simply not mirrored.
        if excludes.is_excluded(&relative, is_dir) {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        if !paths.source_for(&relative).exists() {
            events.push(ChangeEvent {
                kind: ChangeKind::Deleted,
                path: paths.source_for(&relative),
                is_dir: Some(is_dir),
            });
            if is_dir {
                // The tree delete covers everything underneath.
                walker.skip_current_dir();
            }
        }
    }
}

/// Staleness heuristic: missing, type-flipped, size mismatch, or the
/// source modified more recently than the copy
fn needs_copy(src: &Path, dst: &Path) -> bool {
    let src_meta = match fs::metadata(src) {
        Ok(meta) => meta,
        // Vanished mid-scan; the live feed carries the delete.
        Err(_) => return false,
    };
    let dst_meta = match fs::metadata(dst) {
        Ok(meta) => meta,
        Err(_) => return true,
    };
    if dst_meta.is_dir() || src_meta.len() != dst_meta.len() {
        return true;
    }
    match (src_meta.modified(), dst_meta.modified()) {
        (Ok(src_time), Ok(dst_time)) => src_time > dst_time,
        _ => false,
    }
}

/// Periodic reconciliation task
///
/// Ticks immediately on start (the initial sync), then every
/// `interval`. A zero interval disables the periodic loop and runs
/// only the initial pass; `skip_initial` suppresses that first pass.
pub struct PeriodicReconciler {
    paths: MirrorPaths,
    excludes: Arc<ExcludeRules>,
    change_tx: mpsc::Sender<ChangeEvent>,
    interval: Duration,
    skip_initial: bool,
    shutdown: watch::Receiver<bool>,
}

impl PeriodicReconciler {
    pub fn new(
        paths: MirrorPaths,
        excludes: Arc<ExcludeRules>,
        change_tx: mpsc::Sender<ChangeEvent>,
        interval: Duration,
        skip_initial: bool,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            paths,
            excludes,
            change_tx,
            interval,
            skip_initial,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        if self.interval.is_zero() {
            if !self.skip_initial {
                self.pass().await;
            }
            debug!("periodic reconciliation disabled");
            return;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if self.skip_initial {
            // Consume the immediate tick; the first pass then runs a
            // full interval from now.
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => self.pass().await,
            }
        }
        debug!("reconciler stopped");
    }

    async fn pass(&self) {
        let paths = self.paths.clone();
        let excludes = Arc::clone(&self.excludes);
        let scanned = tokio::task::spawn_blocking(move || scan(&paths, &excludes)).await;

        let events = match scanned {
            Ok(events) => events,
            Err(e) => {
                warn!("resync scan aborted: {}", e);
                return;
            }
        };

        if events.is_empty() {
            debug!("resync pass: trees converged");
            return;
        }

        info!("resync pass: {} divergent entries", events.len());
        for event in events {
            // Blocking send: a resync burst waits for queue space
            // instead of overflowing the live feed's bound.
            if self.change_tx.send(event).await.is_err() {
                // Worker is gone; shutdown is underway.
                return;
            }
        }
    }
}
