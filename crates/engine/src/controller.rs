//! Mirror lifecycle
//!
//! `MirrorController` owns the whole pipeline: the change source
//! feeding the bounded queue, the worker draining it, and the
//! reconciler healing drift. States move strictly
//! Idle -> Watching -> Stopping -> Stopped; a controller runs once.

use crate::classify::Classifier;
use crate::resync::{PeriodicReconciler, DEFAULT_RESYNC_INTERVAL_SECS};
use crate::worker::ReplicationWorker;
use anyhow::{bail, Context, Result};
use mirra_core::{MirrorConfig, MirrorPaths};
use mirra_watcher::{ChangeSource, ExcludeRules, DEFAULT_QUEUE_CAPACITY};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Lifecycle state of a mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Configured but not watching
    Idle,
    /// Watcher, worker, and reconciler are running
    Watching,
    /// Stop requested; in-flight work finishing
    Stopping,
    /// Terminal; a new controller is needed to mirror again
    Stopped,
}

/// Counters for one mirroring run
#[derive(Debug, Default)]
pub struct MirrorStats {
    ops_applied: AtomicU64,
    ops_failed: AtomicU64,
}

impl MirrorStats {
    pub(crate) fn record_applied(&self) {
        self.ops_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.ops_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the counters, folding in the queue's drop count
    pub fn snapshot(&self, events_dropped: u64) -> StatsSnapshot {
        StatsSnapshot {
            ops_applied: self.ops_applied.load(Ordering::Relaxed),
            ops_failed: self.ops_failed.load(Ordering::Relaxed),
            events_dropped,
        }
    }
}

/// Point-in-time view of the run counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub ops_applied: u64,
    pub ops_failed: u64,
    pub events_dropped: u64,
}

struct Running {
    source: ChangeSource,
    shutdown_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
    reconciler: JoinHandle<()>,
}

/// Owner of one mirror's lifecycle
pub struct MirrorController {
    config: MirrorConfig,
    resync_interval: Duration,
    skip_initial_sync: bool,
    state: ControllerState,
    stats: Arc<MirrorStats>,
    running: Option<Running>,
}

impl MirrorController {
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            skip_initial_sync: false,
            state: ControllerState::Idle,
            stats: Arc::new(MirrorStats::default()),
            running: None,
        }
    }

    /// Time between reconciliation passes; zero disables the periodic
    /// loop (the initial pass still runs)
    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    /// Leave the first reconciliation pass to the periodic schedule
    /// instead of running it immediately on start
    pub fn skip_initial_sync(mut self, skip: bool) -> Self {
        self.skip_initial_sync = skip;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Validate the configuration and bring the pipeline up
    pub async fn start(&mut self) -> Result<()> {
        if self.state != ControllerState::Idle {
            bail!("mirror cannot start from state {:?}", self.state);
        }

        self.config
            .validate()
            .context("Invalid mirror configuration")?;
        std::fs::create_dir_all(&self.config.destination).with_context(|| {
            format!(
                "Failed to create destination {}",
                self.config.destination.display()
            )
        })?;

        let paths = MirrorPaths::canonicalized(&self.config.source, &self.config.destination)
            .context("Failed to resolve mirror roots")?;
        let excludes = Arc::new(
            ExcludeRules::new(paths.source_root(), &self.config.exclude)
                .context("Invalid exclude pattern")?,
        );

        let (change_tx, change_rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let source = ChangeSource::start(paths.source_root(), change_tx.clone())
            .context("Failed to subscribe to filesystem changes")?;

        let classifier = Classifier::new(paths.clone(), Arc::clone(&excludes));
        let worker = ReplicationWorker::new(
            paths.clone(),
            classifier,
            change_rx,
            shutdown_rx.clone(),
            Arc::clone(&self.stats),
        );
        let worker = tokio::spawn(worker.run());

        let reconciler = PeriodicReconciler::new(
            paths.clone(),
            excludes,
            change_tx,
            self.resync_interval,
            self.skip_initial_sync,
            shutdown_rx,
        );
        let reconciler = tokio::spawn(reconciler.run());

        info!(
            "mirroring {} -> {}",
            paths.source_root().display(),
            paths.dest_root().display()
        );
        self.running = Some(Running {
            source,
            shutdown_tx,
            worker,
            reconciler,
        });
        self.state = ControllerState::Watching;
        Ok(())
    }

    /// Wind the pipeline down and return the final counters
    ///
    /// Queued events are abandoned; the operation in flight completes.
    pub async fn stop(&mut self) -> Result<StatsSnapshot> {
        let running = match self.running.take() {
            Some(running) => running,
            None => bail!("mirror is not running"),
        };
        self.state = ControllerState::Stopping;
        info!("stopping mirror");

        // Both tasks watch this channel; the receiver side going away
        // would stop them too, so a send failure is not interesting.
        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.reconciler.await {
            warn!("reconciler task: {}", e);
        }
        if let Err(e) = running.worker.await {
            warn!("worker task: {}", e);
        }

        let events_dropped = running.source.dropped_events();
        if let Err(e) = running.source.stop() {
            warn!("failed to unsubscribe from source tree: {}", e);
        }

        self.state = ControllerState::Stopped;
        let snapshot = self.stats.snapshot(events_dropped);
        info!(
            "mirror stopped: {} applied, {} failed, {} dropped",
            snapshot.ops_applied, snapshot.ops_failed, snapshot.events_dropped
        );
        Ok(snapshot)
    }
}
