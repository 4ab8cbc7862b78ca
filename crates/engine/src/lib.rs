//! Replication engine for mirra
//!
//! Everything between the change feed and the destination tree:
//! - `Classifier` turns normalized change events into `MirrorOperation`s
//! - `apply` executes operations idempotently against the destination
//! - `ReplicationWorker` is the single serialized consumer of the queue
//! - `PeriodicReconciler` walks both trees and injects synthetic events
//!   for anything the live feed missed
//! - `MirrorController` owns the lifecycle and wires the pieces together

pub mod apply;
pub mod classify;
pub mod controller;
pub mod ops;
pub mod resync;
pub mod worker;

// Re-exports
pub use apply::{ReplicateError, TreeCopyReport};
pub use classify::{Classifier, RENAME_PAIR_WINDOW};
pub use controller::{ControllerState, MirrorController, MirrorStats, StatsSnapshot};
pub use ops::MirrorOperation;
pub use resync::PeriodicReconciler;
pub use worker::ReplicationWorker;
