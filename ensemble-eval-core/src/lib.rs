//! # Ensemble Evaluator Core
//!
//! State model for the live execution of an ensemble of parallel realizations.
//!
//! This crate provides:
//! - Event-source address parsing into hierarchy coordinates
//! - The canonical hierarchical snapshot (ensemble → realization → stage → step → job)
//! - A declarative, parent-first snapshot builder
//! - Partial snapshots (sparse deltas) and the merge that applies them
//! - Worker status events and the control command protocol
//!
//! Nothing here performs I/O or blocks. Transport, persistence and job
//! dispatch live outside the core.

#![forbid(unsafe_code)]

pub mod command;
pub mod event;
pub mod snapshot;
pub mod source;
pub mod status;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::command::Command;
    pub use crate::event::{Event, EventKind, EventTarget};
    pub use crate::snapshot::{
        DataMap, DataValue, Job, JobUpdate, PartialSnapshot, Snapshot, SnapshotBuilder,
        SnapshotDelta, SnapshotExport,
    };
    pub use crate::source::SourceIds;
    pub use crate::status::{EnsembleStatus, NodeStatus};
}

/// Result type for core operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Snapshot(#[from] snapshot::SnapshotError),

    #[error(transparent)]
    Command(#[from] command::CommandError),

    #[error(transparent)]
    Status(#[from] status::ParseStatusError),
}
