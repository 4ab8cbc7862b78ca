//! Change event classification
//!
//! Maps normalized change events onto the closed set of mirror
//! operations. Decisions are stat-directed: the live source tree tells
//! file from directory, and the destination copy answers for entries
//! the source no longer has. The classifier is the only stateful stage
//! in the pipeline; its state is at most one rename half waiting for a
//! partner.

use crate::ops::MirrorOperation;
use mirra_core::MirrorPaths;
use mirra_watcher::{ChangeEvent, ChangeKind, ExcludeRules};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long a lone `RenamedFrom` waits for its `RenamedTo` partner
/// before it is resolved as a deletion
pub const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(100);

/// Stat-directed event-to-operation mapping with rename pairing
pub struct Classifier {
    paths: MirrorPaths,
    excludes: Arc<ExcludeRules>,
    pending_rename: Option<PendingRename>,
}

struct PendingRename {
    relative: PathBuf,
    since: Instant,
}

impl Classifier {
    pub fn new(paths: MirrorPaths, excludes: Arc<ExcludeRules>) -> Self {
        Self {
            paths,
            excludes,
            pending_rename: None,
        }
    }

    /// Classify one event into zero, one, or two operations
    ///
    /// Two operations come out when unrelated activity forces a pending
    /// rename half to resolve first; the flushed operation precedes the
    /// event's own so destination mutations stay in feed order.
    pub fn classify(&mut self, event: ChangeEvent) -> Vec<MirrorOperation> {
        let mut ops = Vec::new();

        // When the destination nests under the source, the engine's own
        // writes echo back through the feed; discard them.
        if self.paths.is_under_destination(&event.path) {
            return ops;
        }

        let relative = match self.paths.relative(&event.path) {
            Some(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            Some(_) => {
                warn!(
                    "change on the watch root itself ignored: {}",
                    event.path.display()
                );
                return ops;
            }
            None => {
                debug!(
                    "change outside the watched tree ignored: {}",
                    event.path.display()
                );
                return ops;
            }
        };

        // Anything other than the partner means the pending half will
        // never pair; resolve it before the new event.
        if event.kind != ChangeKind::RenamedTo {
            if let Some(op) = self.flush_pending() {
                ops.push(op);
            }
        }

        match event.kind {
            ChangeKind::Created | ChangeKind::Modified => {
                if let Some(op) = self.classify_upsert(relative) {
                    ops.push(op);
                }
            }
            ChangeKind::Deleted => {
                ops.push(self.classify_removal(relative, event.is_dir));
            }
            ChangeKind::RenamedFrom => {
                self.pending_rename = Some(PendingRename {
                    relative,
                    since: Instant::now(),
                });
            }
            ChangeKind::RenamedTo => match self.pending_rename.take() {
                Some(pending) => {
                    if let Some(op) = self.classify_move(pending.relative, relative) {
                        ops.push(op);
                    }
                }
                // A lone To: the entry arrived under a name we never saw
                // leave, which mirrors like a creation.
                None => {
                    if let Some(op) = self.classify_upsert(relative) {
                        ops.push(op);
                    }
                }
            },
        }

        ops
    }

    /// Resolve a pending `RenamedFrom` that never met its partner
    ///
    /// Called when the pairing window lapses, when unrelated activity
    /// arrives, and at shutdown. The entry left the tree under a name
    /// that never came back, so it mirrors as a deletion.
    pub fn flush_pending(&mut self) -> Option<MirrorOperation> {
        let pending = self.pending_rename.take()?;
        debug!(
            "unpaired rename-from resolved as delete: {}",
            pending.relative.display()
        );
        Some(self.classify_removal(pending.relative, None))
    }

    /// Deadline by which the pending rename half must be flushed
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending_rename
            .as_ref()
            .map(|pending| pending.since + RENAME_PAIR_WINDOW)
    }

    fn classify_upsert(&self, relative: PathBuf) -> Option<MirrorOperation> {
        // Stat the live entry; any hint carried by the event can be
        // stale by the time the queue drains.
        let source = self.paths.source_for(&relative);
        let is_dir = match std::fs::metadata(&source) {
            Ok(meta) => meta.is_dir(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Gone again already; the trailing delete event settles it.
                debug!("{} vanished before classification", source.display());
                return None;
            }
            Err(e) => {
                warn!("cannot inspect {}: {}", source.display(), e);
                return None;
            }
        };

        if self.excludes.is_excluded(&relative, is_dir) {
            return None;
        }

        if is_dir {
            // Also reached by coalesced directory modifications, where
            // one event stands in for changes anywhere underneath; the
            // recursive copy is idempotent, so over-copying is safe.
            Some(MirrorOperation::CopyTree { path: relative })
        } else {
            Some(MirrorOperation::CopyFile { path: relative })
        }
    }

    // Removals are never gated by excludes: a delete of an excluded
    // source entry at worst re-deletes a destination path that is not
    // there, which is a no-op.
    fn classify_removal(&self, relative: PathBuf, hint: Option<bool>) -> MirrorOperation {
        // The source entry is gone, so the destination copy tells file
        // from tree; the event's hint breaks the tie when neither side
        // has the entry anymore.
        let dest = self.paths.dest_for_relative(&relative);
        let was_dir = match std::fs::metadata(&dest) {
            Ok(meta) => meta.is_dir(),
            Err(_) => hint.unwrap_or(false),
        };

        if was_dir {
            MirrorOperation::DeleteTree { path: relative }
        } else {
            MirrorOperation::DeleteFile { path: relative }
        }
    }

    fn classify_move(&self, from: PathBuf, to: PathBuf) -> Option<MirrorOperation> {
        let to_is_dir = std::fs::metadata(self.paths.source_for(&to))
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        let from_excluded = self.excludes.is_excluded(&from, to_is_dir);
        let to_excluded = self.excludes.is_excluded(&to, to_is_dir);

        match (from_excluded, to_excluded) {
            (false, false) => Some(MirrorOperation::MoveTree { from, to }),
            // Renamed out of the mirrored set: only the old copy goes.
            (false, true) => Some(self.classify_removal(from, Some(to_is_dir))),
            // Renamed into the mirrored set: surfaces as a creation.
            (true, false) => self.classify_upsert(to),
            (true, true) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();
        (temp_dir, src, dst)
    }

    fn classifier(src: &Path, dst: &Path) -> Classifier {
        Classifier::new(MirrorPaths::new(src, dst), Arc::new(ExcludeRules::empty()))
    }

    fn classifier_excluding(src: &Path, dst: &Path, patterns: &[&str]) -> Classifier {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        let excludes = ExcludeRules::new(src, &patterns).unwrap();
        Classifier::new(MirrorPaths::new(src, dst), Arc::new(excludes))
    }

    fn event(kind: ChangeKind, path: PathBuf) -> ChangeEvent {
        ChangeEvent::new(kind, path)
    }

    #[test]
    fn test_created_file_maps_to_copy_file() {
        let (_guard, src, dst) = setup();
        fs::write(src.join("a.txt"), b"x").unwrap();
        let mut classifier = classifier(&src, &dst);

        let ops = classifier.classify(event(ChangeKind::Created, src.join("a.txt")));

        assert_eq!(
            ops,
            vec![MirrorOperation::CopyFile {
                path: PathBuf::from("a.txt")
            }]
        );
    }

    #[test]
    fn test_created_directory_maps_to_copy_tree() {
        let (_guard, src, dst) = setup();
        fs::create_dir(src.join("sub")).unwrap();
        let mut classifier = classifier(&src, &dst);

        let ops = classifier.classify(event(ChangeKind::Created, src.join("sub")));

        assert_eq!(
            ops,
            vec![MirrorOperation::CopyTree {
                path: PathBuf::from("sub")
            }]
        );
    }

    #[test]
    fn test_modified_file_maps_to_copy_file() {
        let (_guard, src, dst) = setup();
        fs::write(src.join("a.txt"), b"edited").unwrap();
        let mut classifier = classifier(&src, &dst);

        let ops = classifier.classify(event(ChangeKind::Modified, src.join("a.txt")));

        assert_eq!(
            ops,
            vec![MirrorOperation::CopyFile {
                path: PathBuf::from("a.txt")
            }]
        );
    }

    /// A coalesced modification on a directory must recopy the tree;
    /// waiting for per-entry events would leave the divergence in
    /// place until the next resync.
    #[test]
    fn test_modified_directory_maps_to_copy_tree() {
        let (_guard, src, dst) = setup();
        fs::create_dir(src.join("sub")).unwrap();
        fs::write(src.join("sub/f.txt"), b"inside").unwrap();
        let mut classifier = classifier(&src, &dst);

        let ops = classifier.classify(event(ChangeKind::Modified, src.join("sub")));

        assert_eq!(
            ops,
            vec![MirrorOperation::CopyTree {
                path: PathBuf::from("sub")
            }]
        );
    }

    #[test]
    fn test_vanished_entry_yields_nothing() {
        let (_guard, src, dst) = setup();
        let mut classifier = classifier(&src, &dst);

        let ops = classifier.classify(event(ChangeKind::Created, src.join("ghost.txt")));

        assert!(ops.is_empty());
    }

    #[test]
    fn test_deleted_maps_by_destination_type() {
        let (_guard, src, dst) = setup();
        fs::create_dir(dst.join("sub")).unwrap();
        fs::write(dst.join("a.txt"), b"x").unwrap();
        let mut classifier = classifier(&src, &dst);

        let tree_ops = classifier.classify(event(ChangeKind::Deleted, src.join("sub")));
        let file_ops = classifier.classify(event(ChangeKind::Deleted, src.join("a.txt")));

        assert_eq!(
            tree_ops,
            vec![MirrorOperation::DeleteTree {
                path: PathBuf::from("sub")
            }]
        );
        assert_eq!(
            file_ops,
            vec![MirrorOperation::DeleteFile {
                path: PathBuf::from("a.txt")
            }]
        );
    }

    #[test]
    fn test_deleted_with_no_copy_follows_hint() {
        let (_guard, src, dst) = setup();
        let mut classifier = classifier(&src, &dst);

        let ops = classifier.classify(ChangeEvent {
            kind: ChangeKind::Deleted,
            path: src.join("was-a-dir"),
            is_dir: Some(true),
        });

        assert_eq!(
            ops,
            vec![MirrorOperation::DeleteTree {
                path: PathBuf::from("was-a-dir")
            }]
        );
    }

    #[test]
    fn test_deleted_unknown_defaults_to_file() {
        let (_guard, src, dst) = setup();
        let mut classifier = classifier(&src, &dst);

        let ops = classifier.classify(event(ChangeKind::Deleted, src.join("unknown")));

        assert_eq!(
            ops,
            vec![MirrorOperation::DeleteFile {
                path: PathBuf::from("unknown")
            }]
        );
    }

    #[test]
    fn test_rename_pair_maps_to_move() {
        let (_guard, src, dst) = setup();
        fs::write(src.join("new.txt"), b"x").unwrap();
        let mut classifier = classifier(&src, &dst);

        let first = classifier.classify(event(ChangeKind::RenamedFrom, src.join("old.txt")));
        let second = classifier.classify(event(ChangeKind::RenamedTo, src.join("new.txt")));

        assert!(first.is_empty());
        assert_eq!(
            second,
            vec![MirrorOperation::MoveTree {
                from: PathBuf::from("old.txt"),
                to: PathBuf::from("new.txt"),
            }]
        );
        assert!(classifier.pending_deadline().is_none());
    }

    #[test]
    fn test_lone_rename_to_maps_to_copy() {
        let (_guard, src, dst) = setup();
        fs::write(src.join("arrived.txt"), b"x").unwrap();
        let mut classifier = classifier(&src, &dst);

        let ops = classifier.classify(event(ChangeKind::RenamedTo, src.join("arrived.txt")));

        assert_eq!(
            ops,
            vec![MirrorOperation::CopyFile {
                path: PathBuf::from("arrived.txt")
            }]
        );
    }

    #[test]
    fn test_unpaired_from_flushes_before_next_event() {
        let (_guard, src, dst) = setup();
        fs::write(src.join("b.txt"), b"x").unwrap();
        fs::write(dst.join("a.txt"), b"stale").unwrap();
        let mut classifier = classifier(&src, &dst);

        classifier.classify(event(ChangeKind::RenamedFrom, src.join("a.txt")));
        let ops = classifier.classify(event(ChangeKind::Created, src.join("b.txt")));

        // Flushed delete first, then the new event's copy.
        assert_eq!(
            ops,
            vec![
                MirrorOperation::DeleteFile {
                    path: PathBuf::from("a.txt")
                },
                MirrorOperation::CopyFile {
                    path: PathBuf::from("b.txt")
                },
            ]
        );
    }

    #[test]
    fn test_flush_pending_resolves_as_delete() {
        let (_guard, src, dst) = setup();
        fs::create_dir(dst.join("gone")).unwrap();
        let mut classifier = classifier(&src, &dst);

        classifier.classify(event(ChangeKind::RenamedFrom, src.join("gone")));
        assert!(classifier.pending_deadline().is_some());

        let op = classifier.flush_pending();

        assert_eq!(
            op,
            Some(MirrorOperation::DeleteTree {
                path: PathBuf::from("gone")
            })
        );
        assert!(classifier.pending_deadline().is_none());
        assert!(classifier.flush_pending().is_none());
    }

    #[test]
    fn test_event_outside_tree_is_ignored() {
        let (guard, src, dst) = setup();
        fs::write(guard.path().join("elsewhere.txt"), b"x").unwrap();
        let mut classifier = classifier(&src, &dst);

        let ops = classifier.classify(event(ChangeKind::Created, guard.path().join("elsewhere.txt")));

        assert!(ops.is_empty());
    }

    #[test]
    fn test_watch_root_event_is_ignored() {
        let (_guard, src, dst) = setup();
        let mut classifier = classifier(&src, &dst);

        let ops = classifier.classify(event(ChangeKind::Deleted, src.clone()));

        assert!(ops.is_empty());
    }

    #[test]
    fn test_destination_echo_is_ignored_when_nested() {
        let (_guard, src, _dst) = setup();
        let nested_dst = src.join(".mirror");
        fs::create_dir(&nested_dst).unwrap();
        fs::write(nested_dst.join("echo.txt"), b"x").unwrap();
        let mut classifier = classifier(&src, &nested_dst);

        let ops = classifier.classify(event(ChangeKind::Created, nested_dst.join("echo.txt")));

        assert!(ops.is_empty());
    }

    #[test]
    fn test_excluded_path_is_not_copied() {
        let (_guard, src, dst) = setup();
        fs::write(src.join("scratch.tmp"), b"x").unwrap();
        let mut classifier = classifier_excluding(&src, &dst, &["*.tmp"]);

        let ops = classifier.classify(event(ChangeKind::Created, src.join("scratch.tmp")));

        assert!(ops.is_empty());
    }

    #[test]
    fn test_excluded_delete_still_propagates() {
        let (_guard, src, dst) = setup();
        let mut classifier = classifier_excluding(&src, &dst, &["*.tmp"]);

        let ops = classifier.classify(event(ChangeKind::Deleted, src.join("scratch.tmp")));

        assert_eq!(
            ops,
            vec![MirrorOperation::DeleteFile {
                path: PathBuf::from("scratch.tmp")
            }]
        );
    }

    #[test]
    fn test_rename_into_excluded_space_deletes_old_copy() {
        let (_guard, src, dst) = setup();
        fs::write(src.join("junk.tmp"), b"x").unwrap();
        fs::write(dst.join("keep.txt"), b"mirrored").unwrap();
        let mut classifier = classifier_excluding(&src, &dst, &["*.tmp"]);

        classifier.classify(event(ChangeKind::RenamedFrom, src.join("keep.txt")));
        let ops = classifier.classify(event(ChangeKind::RenamedTo, src.join("junk.tmp")));

        assert_eq!(
            ops,
            vec![MirrorOperation::DeleteFile {
                path: PathBuf::from("keep.txt")
            }]
        );
    }

    #[test]
    fn test_rename_out_of_excluded_space_copies_fresh() {
        let (_guard, src, dst) = setup();
        fs::write(src.join("keep.txt"), b"now mirrored").unwrap();
        let mut classifier = classifier_excluding(&src, &dst, &["*.tmp"]);

        classifier.classify(event(ChangeKind::RenamedFrom, src.join("junk.tmp")));
        let ops = classifier.classify(event(ChangeKind::RenamedTo, src.join("keep.txt")));

        assert_eq!(
            ops,
            vec![MirrorOperation::CopyFile {
                path: PathBuf::from("keep.txt")
            }]
        );
    }
}
