//! Core types for mirra
//!
//! This crate provides:
//! - `MirrorConfig`: the persisted source/destination configuration record
//! - `MirrorPaths`: the source/destination root pair and the
//!   destination-path computation every mirror operation goes through
//! - `ConfigError`: typed configuration failures

pub mod config;
pub mod error;
pub mod paths;

// Re-exports
pub use config::MirrorConfig;
pub use error::ConfigError;
pub use paths::MirrorPaths;
