//! Idempotent application of mirror operations
//!
//! Every function here converges on the source's current shape no
//! matter what state the destination is in: a target that is already
//! gone, an entry whose type flipped between event and apply, or an
//! operation run twice all land in the same place. File content is
//! written to a temp file and renamed into position so destination
//! readers never observe a half-written file.

use crate::ops::MirrorOperation;
use mirra_core::MirrorPaths;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// An operation that could not be applied, tagged with the action and
/// the path it failed on
#[derive(Debug, Error)]
#[error("failed to {action} {}", .path.display())]
pub struct ReplicateError {
    pub action: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl ReplicateError {
    fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Outcome of a tree copy; per-entry failures do not abort the walk
#[derive(Debug, Default)]
pub struct TreeCopyReport {
    pub files_copied: u64,
    pub dirs_created: u64,
    pub failures: Vec<ReplicateError>,
}

impl TreeCopyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// How a move was realized on the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Old destination entry renamed in place
    Renamed,
    /// Old destination entry was unusable; the surviving source entry
    /// was copied fresh to the new name
    Recopied,
    /// The surviving source entry disappeared too; only removals ran
    Removed,
}

/// Resolve an operation's relative paths against the roots and run it
pub fn apply(paths: &MirrorPaths, op: &MirrorOperation) -> Result<(), ReplicateError> {
    match op {
        MirrorOperation::CopyFile { path } => {
            copy_file(&paths.source_for(path), &paths.dest_for_relative(path))
        }
        MirrorOperation::CopyTree { path } => {
            let report = copy_tree(&paths.source_for(path), &paths.dest_for_relative(path))?;
            log_entry_failures(&report);
            Ok(())
        }
        MirrorOperation::DeleteFile { path } => delete_file(&paths.dest_for_relative(path)),
        MirrorOperation::DeleteTree { path } => delete_tree(&paths.dest_for_relative(path)),
        MirrorOperation::MoveTree { from, to } => {
            let outcome = move_tree(
                &paths.dest_for_relative(from),
                &paths.dest_for_relative(to),
                &paths.source_for(to),
            )?;
            debug!(
                "move {} -> {} realized as {:?}",
                from.display(),
                to.display(),
                outcome
            );
            Ok(())
        }
    }
}

fn log_entry_failures(report: &TreeCopyReport) {
    for failure in &report.failures {
        warn!("tree copy entry skipped: {} ({})", failure, failure.source);
    }
}

/// Copy one file, replacing whatever is at `dst`
pub fn copy_file(src: &Path, dst: &Path) -> Result<(), ReplicateError> {
    let parent = dst.parent().ok_or_else(|| {
        ReplicateError::io(
            "resolve parent of",
            dst,
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"),
        )
    })?;
    fs::create_dir_all(parent).map_err(|e| ReplicateError::io("create directory", parent, e))?;

    // A directory squatting on the name means the entry type flipped
    // since the event fired; rename cannot replace it.
    if dst.is_dir() {
        fs::remove_dir_all(dst).map_err(|e| ReplicateError::io("clear directory at", dst, e))?;
    }

    let mut reader = fs::File::open(src).map_err(|e| ReplicateError::io("open", src, e))?;
    let mut temp = NamedTempFile::new_in(parent)
        .map_err(|e| ReplicateError::io("create temp file in", parent, e))?;
    io::copy(&mut reader, temp.as_file_mut()).map_err(|e| ReplicateError::io("write", dst, e))?;

    let permissions = reader
        .metadata()
        .map_err(|e| ReplicateError::io("inspect", src, e))?
        .permissions();
    temp.as_file()
        .set_permissions(permissions)
        .map_err(|e| ReplicateError::io("set permissions on", dst, e))?;

    // Atomic replace; the temp file cleans itself up if persist fails.
    temp.persist(dst)
        .map_err(|e| ReplicateError::io("replace", dst, e.error))?;
    Ok(())
}

/// Copy a directory tree, replacing whatever is at `dst`
///
/// Entries that cannot be copied (vanished files, sockets, symlinks)
/// are recorded in the report and the walk continues. A tree copy only
/// fails outright when the roots themselves cannot be handled.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<TreeCopyReport, ReplicateError> {
    if dst.exists() && !dst.is_dir() {
        fs::remove_file(dst).map_err(|e| ReplicateError::io("clear file at", dst, e))?;
    }
    fs::create_dir_all(dst).map_err(|e| ReplicateError::io("create directory", dst, e))?;

    let mut report = TreeCopyReport::default();
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((src_dir, dst_dir)) = pending.pop() {
        let entries = match fs::read_dir(&src_dir) {
            Ok(entries) => entries,
            Err(e) if src_dir == src => {
                return Err(ReplicateError::io("read directory", src, e));
            }
            Err(e) => {
                // Subdirectory vanished mid-walk; the rest of the tree
                // is still worth copying.
                report
                    .failures
                    .push(ReplicateError::io("read directory", src_dir, e));
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report
                        .failures
                        .push(ReplicateError::io("read entry in", &src_dir, e));
                    continue;
                }
            };
            let src_path = entry.path();
            let dst_path = dst_dir.join(entry.file_name());
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    report
                        .failures
                        .push(ReplicateError::io("inspect", src_path, e));
                    continue;
                }
            };

            if file_type.is_dir() {
                match fs::create_dir_all(&dst_path) {
                    Ok(()) => {
                        report.dirs_created += 1;
                        pending.push((src_path, dst_path));
                    }
                    Err(e) => report
                        .failures
                        .push(ReplicateError::io("create directory", dst_path, e)),
                }
            } else if file_type.is_file() {
                match copy_file(&src_path, &dst_path) {
                    Ok(()) => report.files_copied += 1,
                    Err(e) => report.failures.push(e),
                }
            } else {
                // Symlinks, sockets, devices: not replicated.
                report.failures.push(ReplicateError::io(
                    "replicate",
                    src_path,
                    io::Error::new(io::ErrorKind::Unsupported, "entry type not replicated"),
                ));
            }
        }
    }

    Ok(report)
}

/// Remove one destination file; a missing target is already done
pub fn delete_file(dst: &Path) -> Result<(), ReplicateError> {
    match fs::remove_file(dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        // The entry grew into a directory since the event fired.
        Err(_) if dst.is_dir() => delete_tree(dst),
        Err(e) => Err(ReplicateError::io("delete", dst, e)),
    }
}

/// Remove a destination tree; a missing target is already done
pub fn delete_tree(dst: &Path) -> Result<(), ReplicateError> {
    match fs::remove_dir_all(dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        // The entry shrank into a plain file since the event fired.
        Err(_) if dst.is_file() => {
            fs::remove_file(dst).map_err(|e| ReplicateError::io("delete", dst, e))
        }
        Err(e) => Err(ReplicateError::io("delete tree", dst, e)),
    }
}

/// Realize a rename on the destination
///
/// Fast path is a plain rename of `dst_from`. When that cannot work,
/// because the old entry was never mirrored or something unrenamable
/// squats on the new name, the move degrades to remove-both then copy
/// fresh from `src_to`, which converges on the same shape.
pub fn move_tree(
    dst_from: &Path,
    dst_to: &Path,
    src_to: &Path,
) -> Result<MoveOutcome, ReplicateError> {
    if let Some(parent) = dst_to.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ReplicateError::io("create directory", parent, e))?;
    }

    if dst_from.exists() {
        match fs::rename(dst_from, dst_to) {
            Ok(()) => return Ok(MoveOutcome::Renamed),
            Err(e) => debug!(
                "rename {} -> {} degraded to re-copy: {}",
                dst_from.display(),
                dst_to.display(),
                e
            ),
        }
    }

    remove_any(dst_from)?;
    remove_any(dst_to)?;

    match fs::metadata(src_to) {
        Ok(meta) if meta.is_dir() => {
            let report = copy_tree(src_to, dst_to)?;
            log_entry_failures(&report);
            Ok(MoveOutcome::Recopied)
        }
        Ok(_) => {
            copy_file(src_to, dst_to)?;
            Ok(MoveOutcome::Recopied)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(MoveOutcome::Removed),
        Err(e) => Err(ReplicateError::io("inspect", src_to, e)),
    }
}

fn remove_any(dst: &Path) -> Result<(), ReplicateError> {
    if dst.is_dir() {
        delete_tree(dst)
    } else {
        delete_file(dst)
    }
}
