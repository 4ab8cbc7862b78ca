//! The closed set of replication operations
//!
//! A `MirrorOperation` is the unit handed from the classifier to the
//! worker. Paths are relative to the tree roots; the apply layer joins
//! them onto the destination (and, for copies, the source) root.

use std::fmt;
use std::path::PathBuf;

/// One mutation of the destination tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOperation {
    /// Copy a single source file over the destination path
    CopyFile { path: PathBuf },
    /// Copy a source directory tree under the destination path
    CopyTree { path: PathBuf },
    /// Remove a single destination file
    DeleteFile { path: PathBuf },
    /// Remove a destination directory tree
    DeleteTree { path: PathBuf },
    /// Rename a destination entry from one relative path to another.
    /// `to` names the surviving source-side entry, which the apply layer
    /// re-copies when the old destination entry is not there to rename.
    MoveTree { from: PathBuf, to: PathBuf },
}

impl fmt::Display for MirrorOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CopyFile { path } => write!(f, "copy file {}", path.display()),
            Self::CopyTree { path } => write!(f, "copy tree {}", path.display()),
            Self::DeleteFile { path } => write!(f, "delete file {}", path.display()),
            Self::DeleteTree { path } => write!(f, "delete tree {}", path.display()),
            Self::MoveTree { from, to } => {
                write!(f, "move {} -> {}", from.display(), to.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_action() {
        let op = MirrorOperation::CopyFile {
            path: PathBuf::from("sub/a.txt"),
        };
        assert_eq!(op.to_string(), "copy file sub/a.txt");

        let op = MirrorOperation::MoveTree {
            from: PathBuf::from("old"),
            to: PathBuf::from("new"),
        };
        assert_eq!(op.to_string(), "move old -> new");
    }
}
