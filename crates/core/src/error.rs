//! Configuration error types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, persisting, or validating a mirror
/// configuration
///
/// All of these are fatal at startup: the process reports them and exits
/// non-zero before any watcher or replication work begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write configuration {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // Reachable: serde_json refuses paths that are not valid UTF-8.
    #[error("configuration is not serializable")]
    Serialize(#[source] serde_json::Error),

    #[error("source directory does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("source path is not a directory: {0}")]
    SourceNotDirectory(PathBuf),

    #[error("source and destination resolve to the same path: {0}")]
    SameTree(PathBuf),
}
