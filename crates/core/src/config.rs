//! Persisted mirror configuration
//!
//! The configuration is a small JSON record:
//!
//! ```json
//! {
//!   "Source": "/data/projects",
//!   "Destination": "/mnt/backup/projects",
//!   "Exclude": ["*.tmp", "target/"]
//! }
//! ```
//!
//! `Exclude` is optional; a two-field record is accepted unchanged. The
//! file is read once at startup and never re-read while the mirror runs.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// The source/destination pair driving one mirror
///
/// Immutable for the process lifetime: owned by the controller and shared
/// read-only with the replication pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Directory tree to watch
    #[serde(rename = "Source")]
    pub source: PathBuf,

    /// Directory tree to keep identical to the source
    #[serde(rename = "Destination")]
    pub destination: PathBuf,

    /// Optional gitignore-style patterns for entries that are not mirrored
    #[serde(rename = "Exclude", default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl MirrorConfig {
    /// Create a configuration with no exclude patterns
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            exclude: Vec::new(),
        }
    }

    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::Missing(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the configuration as pretty-printed JSON, creating parent
    /// directories as needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, json).map_err(write_err)
    }

    /// Check the invariants required before the mirror may start
    ///
    /// The source root must exist and be a directory. The destination may
    /// be missing (it is created on start), but it must not be the same
    /// path as the source.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source.exists() {
            return Err(ConfigError::SourceMissing(self.source.clone()));
        }
        if !self.source.is_dir() {
            return Err(ConfigError::SourceNotDirectory(self.source.clone()));
        }

        // Compare resolved paths where possible so `/src` and `/src/.`
        // are caught, falling back to a literal comparison.
        let source = self.source.canonicalize().unwrap_or_else(|_| self.source.clone());
        let destination = self
            .destination
            .canonicalize()
            .unwrap_or_else(|_| self.destination.clone());
        if source == destination {
            return Err(ConfigError::SameTree(source));
        }

        Ok(())
    }
}
