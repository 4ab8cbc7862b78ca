//! notify subscription bridged into a bounded event queue

use crate::{ChangeEvent, ChangeKind};
use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default capacity of the bounded event queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A running recursive subscription on one source tree
///
/// Events are normalized and pushed into the queue from the platform
/// notification thread with `try_send`: delivery never blocks. When the
/// queue is full the incoming change is the one discarded (counted and
/// logged); changes already queued are never displaced, so the backlog
/// drains in order at the cost of losing the newest change, and the
/// resync pass repairs whatever a dropped event would have mirrored.
/// Dropping the handle stops the subscription.
pub struct ChangeSource {
    watcher: RecommendedWatcher,
    root: PathBuf,
    dropped: Arc<AtomicU64>,
}

impl ChangeSource {
    /// Start watching `root` recursively, delivering into `tx`
    pub fn start(root: &Path, tx: mpsc::Sender<ChangeEvent>) -> Result<Self, notify::Error> {
        let dropped = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&dropped);

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                match result {
                    Ok(event) => {
                        if event.need_rescan() {
                            warn!("change feed requested a rescan; periodic resync will recover");
                        }
                        for change in normalize(event) {
                            deliver(&tx, &counter, change);
                        }
                    }
                    Err(e) => warn!("change feed error: {}", e),
                }
            })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        debug!("watching {} recursively", root.display());

        Ok(Self {
            watcher,
            root: root.to_path_buf(),
            dropped,
        })
    }

    /// Number of changes discarded because the queue was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop the subscription explicitly
    pub fn stop(mut self) -> Result<(), notify::Error> {
        self.watcher.unwatch(&self.root)
    }
}

/// Push one normalized change without blocking the notification thread
///
/// A full queue discards the incoming change, never a queued one.
fn deliver(tx: &mpsc::Sender<ChangeEvent>, dropped: &AtomicU64, change: ChangeEvent) {
    match tx.try_send(change) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(change)) => {
            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "event queue full, dropped change for {} ({} dropped so far)",
                change.path.display(),
                total
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            // Pipeline is shutting down; nothing to deliver to.
        }
    }
}

/// Map one raw notify event onto zero or more normalized changes
///
/// Metadata-only and access events are suppressed: they carry no content
/// or structure change to mirror. Renames come through as a
/// `RenamedFrom`/`RenamedTo` pair when the platform pairs them, or as a
/// single side otherwise; a rename whose direction the platform could
/// not determine is surfaced as `RenamedTo`, which the classifier
/// resolves correctly whether or not the path still exists.
pub fn normalize(event: notify::Event) -> Vec<ChangeEvent> {
    let mut changes = Vec::with_capacity(event.paths.len());

    match event.kind {
        EventKind::Create(kind) => {
            let is_dir = match kind {
                CreateKind::Folder => Some(true),
                CreateKind::File => Some(false),
                _ => None,
            };
            for path in event.paths {
                changes.push(ChangeEvent {
                    kind: ChangeKind::Created,
                    path,
                    is_dir,
                });
            }
        }

        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => {
                for path in event.paths {
                    changes.push(ChangeEvent::new(ChangeKind::RenamedFrom, path));
                }
            }
            RenameMode::To => {
                for path in event.paths {
                    changes.push(ChangeEvent::new(ChangeKind::RenamedTo, path));
                }
            }
            RenameMode::Both => {
                // Paired event: paths[0] is the old name, paths[1] the new.
                let mut paths = event.paths.into_iter();
                if let Some(from) = paths.next() {
                    changes.push(ChangeEvent::new(ChangeKind::RenamedFrom, from));
                }
                if let Some(to) = paths.next() {
                    changes.push(ChangeEvent::new(ChangeKind::RenamedTo, to));
                }
            }
            RenameMode::Any | RenameMode::Other => {
                for path in event.paths {
                    changes.push(ChangeEvent::new(ChangeKind::RenamedTo, path));
                }
            }
        },

        // Timestamps, permissions, ownership: nothing to mirror.
        EventKind::Modify(ModifyKind::Metadata(_)) => {}

        EventKind::Modify(_) => {
            for path in event.paths {
                changes.push(ChangeEvent::new(ChangeKind::Modified, path));
            }
        }

        EventKind::Remove(kind) => {
            let is_dir = match kind {
                RemoveKind::Folder => Some(true),
                RemoveKind::File => Some(false),
                _ => None,
            };
            for path in event.paths {
                changes.push(ChangeEvent {
                    kind: ChangeKind::Deleted,
                    path,
                    is_dir,
                });
            }
        }

        EventKind::Access(_) => {}

        // Unclassified platform noise: treat as a modification and let
        // the classifier's stat sort out what actually happened.
        EventKind::Any | EventKind::Other => {
            for path in event.paths {
                changes.push(ChangeEvent::new(ChangeKind::Modified, path));
            }
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, MetadataKind, ModifyKind};
    use std::time::Duration;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut event = notify::Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn test_create_file_carries_dir_hint() {
        let changes = normalize(event(EventKind::Create(CreateKind::File), &["/s/a.txt"]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Created);
        assert_eq!(changes[0].path, PathBuf::from("/s/a.txt"));
        assert_eq!(changes[0].is_dir, Some(false));
    }

    #[test]
    fn test_create_folder_carries_dir_hint() {
        let changes = normalize(event(EventKind::Create(CreateKind::Folder), &["/s/sub"]));
        assert_eq!(changes[0].is_dir, Some(true));
    }

    #[test]
    fn test_data_modification() {
        let changes = normalize(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/s/a.txt"],
        ));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
        assert_eq!(changes[0].is_dir, None);
    }

    #[test]
    fn test_metadata_and_access_suppressed() {
        let metadata = normalize(event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)),
            &["/s/a.txt"],
        ));
        assert!(metadata.is_empty());

        let access = normalize(event(
            EventKind::Access(notify::event::AccessKind::Read),
            &["/s/a.txt"],
        ));
        assert!(access.is_empty());
    }

    #[test]
    fn test_remove_kinds() {
        let file = normalize(event(EventKind::Remove(RemoveKind::File), &["/s/a.txt"]));
        assert_eq!(file[0].kind, ChangeKind::Deleted);
        assert_eq!(file[0].is_dir, Some(false));

        let folder = normalize(event(EventKind::Remove(RemoveKind::Folder), &["/s/sub"]));
        assert_eq!(folder[0].is_dir, Some(true));
    }

    #[test]
    fn test_rename_pair_orders_from_then_to() {
        let changes = normalize(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/s/old.txt", "/s/new.txt"],
        ));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, ChangeKind::RenamedFrom);
        assert_eq!(changes[0].path, PathBuf::from("/s/old.txt"));
        assert_eq!(changes[1].kind, ChangeKind::RenamedTo);
        assert_eq!(changes[1].path, PathBuf::from("/s/new.txt"));
    }

    #[test]
    fn test_rename_single_sides() {
        let from = normalize(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/s/old.txt"],
        ));
        assert_eq!(from[0].kind, ChangeKind::RenamedFrom);

        let to = normalize(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/s/new.txt"],
        ));
        assert_eq!(to[0].kind, ChangeKind::RenamedTo);
    }

    #[test]
    fn test_rename_unknown_direction_becomes_to() {
        let changes = normalize(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            &["/s/moved.txt"],
        ));
        assert_eq!(changes[0].kind, ChangeKind::RenamedTo);
    }

    #[test]
    fn test_catchall_kinds_become_modified() {
        let changes = normalize(event(EventKind::Any, &["/s/a.txt"]));
        assert_eq!(changes[0].kind, ChangeKind::Modified);
    }

    /// Overflow keeps the queued backlog intact and discards the
    /// incoming change; the count lets the summary report the loss.
    #[test]
    fn test_full_queue_keeps_backlog_and_drops_incoming() {
        let (tx, mut rx) = mpsc::channel(1);
        let dropped = AtomicU64::new(0);

        deliver(&tx, &dropped, ChangeEvent::new(ChangeKind::Created, "/s/first.txt"));
        deliver(&tx, &dropped, ChangeEvent::new(ChangeKind::Created, "/s/second.txt"));
        deliver(&tx, &dropped, ChangeEvent::new(ChangeKind::Created, "/s/third.txt"));

        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.path, PathBuf::from("/s/first.txt"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_live_watch_reports_created_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let source = ChangeSource::start(&root, tx).unwrap();

        // Give the platform watcher a moment to arm before mutating.
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(root.join("hello.txt"), b"hi").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
                Ok(Some(change)) => {
                    if change.path.ends_with("hello.txt") {
                        seen = true;
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {}
            }
        }

        assert!(seen, "expected a change event for hello.txt");
        assert_eq!(source.dropped_events(), 0);
        source.stop().unwrap();
    }
}
