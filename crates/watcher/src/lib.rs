//! Filesystem change feed for mirra
//!
//! This crate turns the platform notification mechanism into an explicit
//! producer/consumer boundary:
//! - `ChangeSource` subscribes to a watched tree via `notify` and pushes
//!   normalized `ChangeEvent`s into a bounded queue without ever blocking
//!   the notification thread
//! - `ExcludeRules` filters entries the configuration says not to mirror

pub mod filter;
pub mod source;

// Re-exports
pub use filter::ExcludeRules;
pub use source::{normalize, ChangeSource, DEFAULT_QUEUE_CAPACITY};

use std::path::PathBuf;

/// A single normalized filesystem change
///
/// Transient: produced by the `ChangeSource`, consumed once by the
/// classifier, then discarded. Delivery order matters; no causal link
/// between separate events is tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened
    pub kind: ChangeKind,
    /// Affected path, absolute under the watched root
    pub path: PathBuf,
    /// Directory-ness as reported by the platform; `None` when unknown.
    /// Resolved lazily by the consumer, since the entry may already be
    /// gone by the time the event is inspected.
    pub is_dir: Option<bool>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            is_dir: None,
        }
    }
}

/// Kind of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Entry appeared
    Created,
    /// Entry contents changed
    Modified,
    /// Entry disappeared
    Deleted,
    /// Old side of a rename
    RenamedFrom,
    /// New side of a rename
    RenamedTo,
}
