//! The canonical ensemble snapshot.
//!
//! ```text
//! Ensemble
//!  └─ Realization (real id)
//!      └─ Stage (stage id)
//!          └─ Step (step id)
//!              └─ Job (job id)
//! ```
//!
//! A [`Snapshot`] is created once per ensemble run by [`SnapshotBuilder`] and
//! afterwards mutated only by merging [`PartialSnapshot`]s or decoded
//! [`SnapshotDelta`]s. The schema (which ids exist where) never changes after
//! build: merges that reference unknown paths fail and leave the snapshot
//! untouched.
//!
//! Node statuses are independent. Nothing here rolls child status up into a
//! parent; that policy belongs to consumers.
//!
//! A snapshot is not internally synchronised. One owner performs all merges
//! (see the reconciler in `ensemble-eval-runtime`); partials may be built
//! concurrently since they only share the immutable schema.

mod builder;
mod delta;
mod model;
mod partial;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

pub use builder::SnapshotBuilder;
pub use delta::{JobUpdate, Patch, RealizationDelta, SnapshotDelta, StageDelta, StepDelta};
pub use model::{DataMap, DataValue, Job, Realization, SnapshotExport, Stage, Step};
pub use partial::PartialSnapshot;

use crate::status::EnsembleStatus;
use model::Schema;

/// Errors raised by snapshot construction, lookup, recording and merge.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unknown realization {real:?}")]
    UnknownRealization { real: String },

    #[error("unknown stage {stage:?} in realization {real:?}")]
    UnknownStage { real: String, stage: String },

    #[error("unknown step {step:?} in realization {real:?} stage {stage:?}")]
    UnknownStep {
        real: String,
        stage: String,
        step: String,
    },

    #[error("unknown job {job:?} in realization {real:?} stage {stage:?} step {step:?}")]
    UnknownJob {
        real: String,
        stage: String,
        step: String,
        job: String,
    },

    /// A step or job was declared before its parent.
    #[error("{level} {id:?} has not been declared")]
    UndeclaredParent { level: &'static str, id: String },

    #[error("duplicate {level} id {id:?}")]
    DuplicateId { level: &'static str, id: String },

    /// Realizations in a full tree do not share one stage/step/job layout.
    #[error("realization {real:?} does not match the ensemble schema")]
    SchemaMismatch { real: String },

    /// An event source does not resolve deep enough for its event kind.
    #[error("source {source_addr:?} does not resolve to a {required}")]
    UnresolvedSource {
        source_addr: String,
        required: &'static str,
    },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The canonical, mutable state tree of one ensemble.
#[derive(Debug, Clone)]
pub struct Snapshot {
    status: EnsembleStatus,
    reals: BTreeMap<String, Realization>,
    schema: Arc<Schema>,
}

impl Snapshot {
    /// Current ensemble status.
    pub fn get_status(&self) -> EnsembleStatus {
        self.status
    }

    /// Realization ids in ascending order.
    pub fn realization_ids(&self) -> impl Iterator<Item = &str> {
        self.reals.keys().map(String::as_str)
    }

    /// Every realization with its id.
    pub fn realizations(&self) -> impl Iterator<Item = (&str, &Realization)> {
        self.reals.iter().map(|(id, real)| (id.as_str(), real))
    }

    /// Look up one realization.
    pub fn get_realization(&self, real_id: &str) -> Result<&Realization, SnapshotError> {
        self.reals
            .get(real_id)
            .ok_or_else(|| SnapshotError::UnknownRealization {
                real: real_id.to_string(),
            })
    }

    /// Look up one stage.
    pub fn get_stage(&self, real_id: &str, stage_id: &str) -> Result<&Stage, SnapshotError> {
        self.get_realization(real_id)?
            .stages
            .get(stage_id)
            .ok_or_else(|| SnapshotError::UnknownStage {
                real: real_id.to_string(),
                stage: stage_id.to_string(),
            })
    }

    /// Look up one step.
    pub fn get_step(
        &self,
        real_id: &str,
        stage_id: &str,
        step_id: &str,
    ) -> Result<&Step, SnapshotError> {
        self.get_stage(real_id, stage_id)?
            .steps
            .get(step_id)
            .ok_or_else(|| SnapshotError::UnknownStep {
                real: real_id.to_string(),
                stage: stage_id.to_string(),
                step: step_id.to_string(),
            })
    }

    /// The full current record of one job.
    pub fn get_job(
        &self,
        real_id: &str,
        stage_id: &str,
        step_id: &str,
        job_id: &str,
    ) -> Result<&Job, SnapshotError> {
        self.get_step(real_id, stage_id, step_id)?
            .jobs
            .get(job_id)
            .ok_or_else(|| SnapshotError::UnknownJob {
                real: real_id.to_string(),
                stage: stage_id.to_string(),
                step: step_id.to_string(),
                job: job_id.to_string(),
            })
    }

    /// Apply every update recorded in `partial`.
    ///
    /// A partial recorded against another snapshot instance is re-validated
    /// against this one first; on failure nothing is applied.
    pub fn merge_event(&mut self, partial: PartialSnapshot) -> Result<(), SnapshotError> {
        let (schema, delta) = partial.into_parts();
        if !Arc::ptr_eq(&schema, &self.schema) {
            self.schema.validate(&delta)?;
        }
        self.apply(delta)
    }

    /// Apply a decoded delta. All paths are validated before any mutation.
    pub fn merge_delta(&mut self, delta: SnapshotDelta) -> Result<(), SnapshotError> {
        self.schema.validate(&delta)?;
        self.apply(delta)
    }

    fn apply(&mut self, delta: SnapshotDelta) -> Result<(), SnapshotError> {
        let jobs = delta.job_count();
        if let Some(status) = delta.status {
            self.status = status;
        }

        for (real_id, real_delta) in delta.reals {
            let real = self
                .reals
                .get_mut(&real_id)
                .ok_or_else(|| SnapshotError::UnknownRealization {
                    real: real_id.clone(),
                })?;
            if let Some(status) = real_delta.status {
                real.status = status;
            }
            if let Some(active) = real_delta.active {
                real.active = active;
            }

            for (stage_id, stage_delta) in real_delta.stages {
                let stage = real
                    .stages
                    .get_mut(&stage_id)
                    .ok_or_else(|| SnapshotError::UnknownStage {
                        real: real_id.clone(),
                        stage: stage_id.clone(),
                    })?;
                if let Some(status) = stage_delta.status {
                    stage.status = status;
                }

                for (step_id, step_delta) in stage_delta.steps {
                    let step = stage.steps.get_mut(&step_id).ok_or_else(|| {
                        SnapshotError::UnknownStep {
                            real: real_id.clone(),
                            stage: stage_id.clone(),
                            step: step_id.clone(),
                        }
                    })?;
                    if let Some(status) = step_delta.status {
                        step.status = status;
                    }

                    for (job_id, update) in step_delta.jobs {
                        let job = step.jobs.get_mut(&job_id).ok_or_else(|| {
                            SnapshotError::UnknownJob {
                                real: real_id.clone(),
                                stage: stage_id.clone(),
                                step: step_id.clone(),
                                job: job_id.clone(),
                            }
                        })?;
                        update.apply(job);
                    }
                }
            }
        }

        tracing::debug!(status = %self.status, jobs, "delta merged");
        Ok(())
    }

    /// Typed copy of the whole tree.
    pub fn export(&self) -> SnapshotExport {
        SnapshotExport {
            status: self.status,
            reals: self.reals.clone(),
        }
    }

    /// Full-tree structured form, for sending to a newly attached consumer.
    pub fn to_dict(&self) -> Result<serde_json::Value, SnapshotError> {
        serde_json::to_value(self.export()).map_err(SnapshotError::Encode)
    }

    /// Rebuild a snapshot (schema included) from an exported tree.
    pub fn from_export(export: SnapshotExport) -> Result<Self, SnapshotError> {
        let schema = Schema::from_realizations(&export.reals)?;
        Ok(Self {
            status: export.status,
            reals: export.reals,
            schema: Arc::new(schema),
        })
    }

    /// Rebuild a snapshot from its full-tree structured form.
    pub fn from_dict(value: serde_json::Value) -> Result<Self, SnapshotError> {
        Self::from_export(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::NodeStatus;

    fn two_jobs() -> Snapshot {
        SnapshotBuilder::new()
            .add_stage("0", NodeStatus::Unknown)
            .and_then(|b| b.add_step("0", "0", NodeStatus::Unknown))
            .and_then(|b| b.add_job("0", "0", "0", "job0", DataMap::new(), NodeStatus::Unknown))
            .and_then(|b| b.add_job("0", "0", "1", "job1", DataMap::new(), NodeStatus::Unknown))
            .unwrap()
            .build(["0", "1"], EnsembleStatus::Unknown)
    }

    #[test]
    fn status_merge_leaves_jobs_untouched() {
        let mut snapshot = two_jobs();
        let before = snapshot.export().reals;

        let mut partial = PartialSnapshot::new(&snapshot);
        partial.update_status(EnsembleStatus::Running);
        snapshot.merge_event(partial).unwrap();

        assert_eq!(snapshot.get_status(), EnsembleStatus::Running);
        assert_eq!(snapshot.export().reals, before);
    }

    #[test]
    fn data_keys_accumulate_across_merges() {
        let mut snapshot = two_jobs();

        let mut first = PartialSnapshot::new(&snapshot);
        first
            .update_job("0", "0", "0", "0", JobUpdate::new().data("memory", 1000))
            .unwrap();
        snapshot.merge_event(first).unwrap();

        let mut second = PartialSnapshot::new(&snapshot);
        second
            .update_job("0", "0", "0", "0", JobUpdate::new().data("cpu", 0.5))
            .unwrap();
        snapshot.merge_event(second).unwrap();

        let job = snapshot.get_job("0", "0", "0", "0").unwrap();
        assert_eq!(job.data["memory"], DataValue::I64(1000));
        assert_eq!(job.data["cpu"], DataValue::F64(0.5));
    }

    #[test]
    fn explicit_null_clears_a_field() {
        let mut snapshot = two_jobs();

        let mut fail = PartialSnapshot::new(&snapshot);
        fail.update_job("1", "0", "0", "1", JobUpdate::new().error("segfault"))
            .unwrap();
        snapshot.merge_event(fail).unwrap();
        assert_eq!(
            snapshot.get_job("1", "0", "0", "1").unwrap().error.as_deref(),
            Some("segfault")
        );

        let mut retry = PartialSnapshot::new(&snapshot);
        retry
            .update_job("1", "0", "0", "1", JobUpdate::new().clear_error())
            .unwrap();
        snapshot.merge_event(retry).unwrap();
        assert_eq!(snapshot.get_job("1", "0", "0", "1").unwrap().error, None);
    }

    #[test]
    fn coarse_updates_do_not_roll_up_or_down() {
        let mut snapshot = two_jobs();
        let mut partial = PartialSnapshot::new(&snapshot);
        partial
            .update_step("0", "0", "0", NodeStatus::Failed)
            .unwrap()
            .update_realization("0", None, Some(false))
            .unwrap();
        snapshot.merge_event(partial).unwrap();

        assert_eq!(snapshot.get_step("0", "0", "0").unwrap().status, NodeStatus::Failed);
        assert_eq!(snapshot.get_stage("0", "0").unwrap().status, NodeStatus::Unknown);
        assert_eq!(
            snapshot.get_job("0", "0", "0", "0").unwrap().status,
            NodeStatus::Unknown
        );
        let real = snapshot.get_realization("0").unwrap();
        assert!(!real.active);
        assert_eq!(real.status, NodeStatus::Unknown);
    }

    #[test]
    fn foreign_partial_with_unknown_path_is_rejected_atomically() {
        let wide = SnapshotBuilder::new()
            .add_stage("0", NodeStatus::Unknown)
            .and_then(|b| b.add_step("0", "0", NodeStatus::Unknown))
            .and_then(|b| b.add_job("0", "0", "0", "job0", DataMap::new(), NodeStatus::Unknown))
            .unwrap()
            .build(["0", "1", "2"], EnsembleStatus::Unknown);
        let mut narrow = two_jobs();

        let mut partial = PartialSnapshot::new(&wide);
        partial.update_status(EnsembleStatus::Failed);
        partial
            .update_job("0", "0", "0", "0", JobUpdate::new().status(NodeStatus::Running))
            .unwrap()
            .update_job("2", "0", "0", "0", JobUpdate::new().status(NodeStatus::Running))
            .unwrap();

        let err = narrow.merge_event(partial).unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownRealization { ref real } if real == "2"));
        assert_eq!(narrow.get_status(), EnsembleStatus::Unknown);
        assert_eq!(
            narrow.get_job("0", "0", "0", "0").unwrap().status,
            NodeStatus::Unknown
        );
    }

    #[test]
    fn dict_round_trip_produces_an_equivalent_replica() {
        let mut snapshot = two_jobs();
        let mut partial = PartialSnapshot::new(&snapshot);
        partial
            .update_job("1", "0", "0", "0", JobUpdate::new().status(NodeStatus::Finished))
            .unwrap();
        snapshot.merge_event(partial).unwrap();

        let replica = Snapshot::from_dict(snapshot.to_dict().unwrap()).unwrap();
        assert_eq!(replica.export(), snapshot.export());
        assert!(matches!(
            replica.get_job("1", "1", "0", "0"),
            Err(SnapshotError::UnknownStage { .. })
        ));
    }

    #[test]
    fn serde_failures_name_their_direction() {
        let json_err = || serde_json::from_str::<SnapshotExport>("{").unwrap_err();
        assert!(SnapshotError::Encode(json_err()).to_string().starts_with("encode error"));
        assert!(SnapshotError::from(json_err()).to_string().starts_with("decode error"));
        assert!(matches!(
            Snapshot::from_dict(serde_json::json!([1, 2])),
            Err(SnapshotError::Decode(_))
        ));
    }
}
