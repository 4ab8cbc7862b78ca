//! Source/destination path algebra
//!
//! Every mirror operation's destination is `destination_root` joined with
//! the path relative to `source_root`. All of that arithmetic lives here
//! so the rest of the engine cannot accidentally echo an absolute source
//! path or join the destination prefix twice.

use std::io;
use std::path::{Path, PathBuf};

/// The canonical source/destination root pair for one mirror
#[derive(Debug, Clone)]
pub struct MirrorPaths {
    source_root: PathBuf,
    dest_root: PathBuf,
}

impl MirrorPaths {
    /// Create a pair from roots that are already absolute and resolved
    pub fn new(source_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
        }
    }

    /// Create a pair with both roots canonicalized
    ///
    /// Both paths must exist. Canonicalizing up front keeps
    /// `strip_prefix` reliable when the platform reports events under a
    /// resolved prefix (`/private/var` vs `/var` on macOS).
    pub fn canonicalized(source_root: &Path, dest_root: &Path) -> io::Result<Self> {
        Ok(Self {
            source_root: source_root.canonicalize()?,
            dest_root: dest_root.canonicalize()?,
        })
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Path of `source_path` relative to the source root
    ///
    /// Returns `None` for paths outside the watched tree. The source root
    /// itself maps to an empty relative path.
    pub fn relative<'a>(&self, source_path: &'a Path) -> Option<&'a Path> {
        source_path.strip_prefix(&self.source_root).ok()
    }

    /// Destination path mirroring `source_path`
    ///
    /// Always `dest_root + relative`, never an echoed absolute source
    /// path. Returns `None` for paths outside the watched tree.
    pub fn dest_for(&self, source_path: &Path) -> Option<PathBuf> {
        self.relative(source_path).map(|rel| self.dest_root.join(rel))
    }

    /// Source path for an entry known by its relative path
    pub fn source_for(&self, relative: &Path) -> PathBuf {
        self.source_root.join(relative)
    }

    /// Destination path for an entry known by its relative path
    pub fn dest_for_relative(&self, relative: &Path) -> PathBuf {
        self.dest_root.join(relative)
    }

    /// Path of `dest_path` relative to the destination root
    ///
    /// The inverse lookup for destination-side scans. Returns `None`
    /// for paths outside the destination tree.
    pub fn relative_in_dest<'a>(&self, dest_path: &'a Path) -> Option<&'a Path> {
        dest_path.strip_prefix(&self.dest_root).ok()
    }

    /// True when `path` is the watch root itself
    pub fn is_root(&self, path: &Path) -> bool {
        matches!(self.relative(path), Some(rel) if rel.as_os_str().is_empty())
    }

    /// True when `path` lies inside the destination tree
    ///
    /// Used as the feedback-loop guard: when the destination is nested
    /// under the source, the engine's own writes show up in the event
    /// feed and must be discarded.
    pub fn is_under_destination(&self, path: &Path) -> bool {
        path.starts_with(&self.dest_root)
    }
}
