//! Partial snapshots: per-event accumulators of intended mutations.

use std::sync::Arc;

use super::delta::{JobUpdate, SnapshotDelta};
use super::model::Schema;
use super::{Snapshot, SnapshotError};
use crate::status::{EnsembleStatus, NodeStatus};

/// A sparse set of updates recorded against a snapshot's schema.
///
/// Construction only captures the schema of the reference snapshot (shared,
/// immutable), never its values, so a partial can be filled on any thread
/// while the owner keeps merging. Each update is validated when recorded.
/// Updates to the same field fold together last-write-wins, which makes the
/// merged result identical to applying them one by one in record order.
#[derive(Debug, Clone)]
pub struct PartialSnapshot {
    schema: Arc<Schema>,
    delta: SnapshotDelta,
}

impl PartialSnapshot {
    /// Create an empty partial bound to the schema of `snapshot`.
    pub fn new(snapshot: &Snapshot) -> Self {
        Self {
            schema: Arc::clone(&snapshot.schema),
            delta: SnapshotDelta::default(),
        }
    }

    /// Bind a decoded delta to a snapshot, checking every path it references.
    pub fn from_delta(snapshot: &Snapshot, delta: SnapshotDelta) -> Result<Self, SnapshotError> {
        snapshot.schema.validate(&delta)?;
        Ok(Self {
            schema: Arc::clone(&snapshot.schema),
            delta,
        })
    }

    /// Set the ensemble status.
    pub fn update_status(&mut self, status: EnsembleStatus) -> &mut Self {
        self.delta.status = Some(status);
        self
    }

    /// Set the status and active flag of one realization.
    pub fn update_realization(
        &mut self,
        real_id: &str,
        status: Option<NodeStatus>,
        active: Option<bool>,
    ) -> Result<&mut Self, SnapshotError> {
        self.schema.check_real(real_id)?;
        let real = self.delta.realization_mut(real_id);
        if status.is_some() {
            real.status = status;
        }
        if active.is_some() {
            real.active = active;
        }
        Ok(self)
    }

    /// Set the status of one stage.
    pub fn update_stage(
        &mut self,
        real_id: &str,
        stage_id: &str,
        status: NodeStatus,
    ) -> Result<&mut Self, SnapshotError> {
        self.schema.check_stage(real_id, stage_id)?;
        self.delta.stage_mut(real_id, stage_id).status = Some(status);
        Ok(self)
    }

    /// Set the status of one step.
    pub fn update_step(
        &mut self,
        real_id: &str,
        stage_id: &str,
        step_id: &str,
        status: NodeStatus,
    ) -> Result<&mut Self, SnapshotError> {
        self.schema.check_step(real_id, stage_id, step_id)?;
        self.delta.step_mut(real_id, stage_id, step_id).status = Some(status);
        Ok(self)
    }

    /// Record a sparse job update. Fields left unset in `update` are not
    /// part of the delta; `update.data` merges key by key.
    pub fn update_job(
        &mut self,
        real_id: &str,
        stage_id: &str,
        step_id: &str,
        job_id: &str,
        update: JobUpdate,
    ) -> Result<&mut Self, SnapshotError> {
        self.schema.check_job(real_id, stage_id, step_id, job_id)?;
        self.delta
            .step_mut(real_id, stage_id, step_id)
            .jobs
            .entry(job_id.to_string())
            .or_default()
            .absorb(update);
        Ok(self)
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.delta.is_empty()
    }

    /// The compacted updates recorded so far.
    pub fn delta(&self) -> &SnapshotDelta {
        &self.delta
    }

    /// Consume the partial into its delta.
    pub fn into_delta(self) -> SnapshotDelta {
        self.delta
    }

    /// Structured form of the recorded updates.
    pub fn to_dict(&self) -> Result<serde_json::Value, SnapshotError> {
        self.delta.to_dict()
    }

    pub(crate) fn into_parts(self) -> (Arc<Schema>, SnapshotDelta) {
        (self.schema, self.delta)
    }
}
