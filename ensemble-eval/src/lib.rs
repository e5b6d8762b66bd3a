//! # Ensemble Evaluator
//!
//! Live state tracking for an ensemble of parallel realizations.
//!
//! A [`Snapshot`] is declared once with a [`SnapshotBuilder`], then kept current
//! by merging [`PartialSnapshot`]s built from worker events. Consumers receive
//! the full tree once and sparse deltas after that.
//!
//! ## Quick Start
//!
//! ```rust
//! use ensemble_eval::prelude::*;
//!
//! # fn main() -> Result<(), SnapshotError> {
//! let mut snapshot = SnapshotBuilder::new()
//!     .add_stage("0", NodeStatus::Unknown)?
//!     .add_step("0", "0", NodeStatus::Unknown)?
//!     .add_job("0", "0", "0", "forward_model", DataMap::new(), NodeStatus::Unknown)?
//!     .build(["0", "1"], EnsembleStatus::Starting);
//!
//! let mut partial = PartialSnapshot::new(&snapshot);
//! partial.update_job("1", "0", "0", "0", JobUpdate::new().status(NodeStatus::Running))?;
//! snapshot.merge_event(partial)?;
//!
//! assert_eq!(snapshot.get_job("1", "0", "0", "0")?.status, NodeStatus::Running);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`ensemble_eval_core`]: identifiers, snapshot model, merge, commands, events
//! - [`ensemble_eval_net`]: wire envelopes, sequencing, transport abstraction
//! - [`ensemble_eval_runtime`]: the reconciler actor (Tokio)

#![forbid(unsafe_code)]

pub use ensemble_eval_core as core;
pub use ensemble_eval_net as net;
pub use ensemble_eval_runtime as runtime;

pub use ensemble_eval_core::{
    command::Command,
    event::{Event, EventKind},
    snapshot::{
        JobUpdate, PartialSnapshot, Snapshot, SnapshotBuilder, SnapshotDelta, SnapshotError,
        SnapshotExport,
    },
    source::SOURCE_PREFIX,
    status::{EnsembleStatus, NodeStatus},
};
pub use ensemble_eval_net::protocol::{Message, MessageEnvelope, MessageType};
pub use ensemble_eval_runtime::{
    ControlState, Reconciler, ReconcilerConfig, ReconcilerHandle, RuntimeError,
};

pub mod replay;
pub mod summary;

pub use summary::ProgressSummary;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::prelude::*;
    pub use crate::core::snapshot::SnapshotError;
    pub use crate::net::prelude::*;
    pub use crate::runtime::{ControlState, Reconciler, ReconcilerHandle};

    pub use crate::{EvaluatorConfig, ProgressSummary};
}

/// Result type for façade operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("source {0:?} is not addressed to this evaluator")]
    ForeignSource(String),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

/// Evaluator settings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Reconciler inbox size
    pub inbox_capacity: usize,
    /// Broadcast buffer per delta subscriber
    pub subscriber_capacity: usize,
    /// Reject duplicate and stale envelopes per sender
    pub enforce_sequencing: bool,
    /// Out-of-order tolerance when sequencing is enforced
    pub sequence_window: u64,
    /// Senders tracked by the sequence guard before eviction
    pub max_tracked_sources: usize,
    /// Events whose source does not start with this prefix are foreign
    pub source_prefix: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        let reconciler = ReconcilerConfig::default();
        Self {
            inbox_capacity: reconciler.inbox_capacity,
            subscriber_capacity: reconciler.subscriber_capacity,
            enforce_sequencing: reconciler.enforce_sequencing,
            sequence_window: reconciler.sequence_window,
            max_tracked_sources: reconciler.max_tracked_sources,
            source_prefix: SOURCE_PREFIX.to_string(),
        }
    }
}

impl EvaluatorConfig {
    /// Create a builder starting from the defaults.
    pub fn builder() -> EvaluatorConfigBuilder {
        EvaluatorConfigBuilder::new()
    }

    /// Parse a JSON configuration; omitted fields keep their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Settings for [`Reconciler::spawn`]
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            inbox_capacity: self.inbox_capacity,
            subscriber_capacity: self.subscriber_capacity,
            enforce_sequencing: self.enforce_sequencing,
            sequence_window: self.sequence_window,
            max_tracked_sources: self.max_tracked_sources,
        }
    }

    /// Whether `source` is addressed to this evaluator
    pub fn accepts_source(&self, source: &str) -> bool {
        source
            .strip_prefix(self.source_prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// Builder for EvaluatorConfig
#[derive(Debug, Default)]
pub struct EvaluatorConfigBuilder {
    config: EvaluatorConfig,
}

impl EvaluatorConfigBuilder {
    /// Create a builder starting from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reconciler inbox size.
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.config.inbox_capacity = capacity;
        self
    }

    /// Set the per-subscriber delta buffer.
    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.config.subscriber_capacity = capacity;
        self
    }

    /// Enable the per-sender sequence guard
    pub fn enforce_sequencing(mut self, enabled: bool) -> Self {
        self.config.enforce_sequencing = enabled;
        self
    }

    /// Set the out-of-order tolerance per sender.
    pub fn sequence_window(mut self, window: u64) -> Self {
        self.config.sequence_window = window;
        self
    }

    /// Set how many senders the sequence guard remembers.
    pub fn max_tracked_sources(mut self, sources: usize) -> Self {
        self.config.max_tracked_sources = sources;
        self
    }

    /// Set the address prefix accepted from workers.
    pub fn source_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.source_prefix = prefix.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> EvaluatorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EvaluatorConfig::builder()
            .inbox_capacity(8)
            .enforce_sequencing(true)
            .sequence_window(4)
            .build();

        assert_eq!(config.inbox_capacity, 8);
        assert_eq!(config.subscriber_capacity, 256);

        let reconciler = config.reconciler_config();
        assert!(reconciler.enforce_sequencing);
        assert_eq!(reconciler.sequence_window, 4);
        assert_eq!(reconciler.max_tracked_sources, 1000);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = EvaluatorConfig::from_json(r#"{"subscriber_capacity": 16}"#).unwrap();
        assert_eq!(config.subscriber_capacity, 16);
        assert_eq!(config.inbox_capacity, 1024);
        assert_eq!(config.source_prefix, "/ert/ee");
    }

    #[test]
    fn test_source_prefix_matches_whole_segments() {
        let config = EvaluatorConfig::default();
        assert!(config.accepts_source("/ert/ee/0/real/1"));
        assert!(!config.accepts_source("/ert/eee/0/real/1"));
        assert!(!config.accepts_source("/other/0"));
    }
}
