//! The serialized replication worker
//!
//! One task consumes the event queue, classifies, and applies. A
//! single consumer gives the destination a total order of mutations;
//! the filesystem work itself runs on the blocking pool. Shutdown is
//! biased: events still queued are abandoned, the operation in flight
//! completes, and resync covers whatever was abandoned.

use crate::apply;
use crate::classify::Classifier;
use crate::controller::MirrorStats;
use crate::ops::MirrorOperation;
use mirra_core::MirrorPaths;
use mirra_watcher::ChangeEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

/// Consecutive failures after which replication trouble is reported as
/// structural rather than transient
const STRUCTURAL_FAILURE_STREAK: u64 = 5;

enum Next {
    Event(ChangeEvent),
    FlushDeadline,
    Shutdown,
}

/// Single consumer of the change queue
pub struct ReplicationWorker {
    paths: MirrorPaths,
    classifier: Classifier,
    events: mpsc::Receiver<ChangeEvent>,
    shutdown: watch::Receiver<bool>,
    stats: Arc<MirrorStats>,
    failure_streak: u64,
}

impl ReplicationWorker {
    pub fn new(
        paths: MirrorPaths,
        classifier: Classifier,
        events: mpsc::Receiver<ChangeEvent>,
        shutdown: watch::Receiver<bool>,
        stats: Arc<MirrorStats>,
    ) -> Self {
        Self {
            paths,
            classifier,
            events,
            shutdown,
            stats,
            failure_streak: 0,
        }
    }

    /// Drain the queue until shutdown or until the feed closes
    pub async fn run(mut self) {
        loop {
            match self.next_event().await {
                Next::Event(event) => {
                    for op in self.classifier.classify(event) {
                        self.apply_op(op).await;
                    }
                }
                Next::FlushDeadline => {
                    if let Some(op) = self.classifier.flush_pending() {
                        self.apply_op(op).await;
                    }
                }
                Next::Shutdown => break,
            }
        }

        // A rename half caught by the shutdown still resolves; its
        // event was already consumed and would otherwise be lost.
        if let Some(op) = self.classifier.flush_pending() {
            self.apply_op(op).await;
        }
        debug!("replication worker stopped");
    }

    async fn next_event(&mut self) -> Next {
        let deadline = self.classifier.pending_deadline();
        let shutdown = &mut self.shutdown;
        let events = &mut self.events;

        match deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => Next::Shutdown,
                    _ = tokio::time::sleep_until(deadline.into()) => Next::FlushDeadline,
                    event = events.recv() => match event {
                        Some(event) => Next::Event(event),
                        None => Next::Shutdown,
                    },
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => Next::Shutdown,
                    event = events.recv() => match event {
                        Some(event) => Next::Event(event),
                        None => Next::Shutdown,
                    },
                }
            }
        }
    }

    async fn apply_op(&mut self, op: MirrorOperation) {
        debug!("applying {}", op);
        let paths = self.paths.clone();
        let task = tokio::task::spawn_blocking(move || apply::apply(&paths, &op));

        match task.await {
            Ok(Ok(())) => {
                self.failure_streak = 0;
                self.stats.record_applied();
            }
            Ok(Err(e)) => {
                self.stats.record_failed();
                self.failure_streak += 1;
                // A lone failure is transient and the next event or
                // resync pass converges the entry; an unbroken run of
                // them points at the destination itself.
                if self.failure_streak >= STRUCTURAL_FAILURE_STREAK {
                    error!(
                        "{} ({}); {} consecutive failures",
                        e, e.source, self.failure_streak
                    );
                } else {
                    warn!("{} ({})", e, e.source);
                }
            }
            Err(e) => {
                self.stats.record_failed();
                error!("replication task aborted: {}", e);
            }
        }
    }
}
