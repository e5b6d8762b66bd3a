//! Declarative construction of a fully populated snapshot.
//!
//! The schema is declared parent-first: a stage, then steps under it, then
//! jobs under each step. Every declaration is checked against the parents
//! declared so far, so a step or job naming an undeclared parent is rejected
//! at the call that introduced it rather than at `build`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::model::{DataMap, Job, Realization, Schema, Stage, Step};
use super::{Snapshot, SnapshotError};
use crate::status::{EnsembleStatus, NodeStatus};

#[derive(Debug, Clone)]
struct JobDecl {
    name: String,
    data: DataMap,
    status: NodeStatus,
}

#[derive(Debug, Clone)]
struct StepDecl {
    status: NodeStatus,
    jobs: BTreeMap<String, JobDecl>,
}

#[derive(Debug, Clone)]
struct StageDecl {
    status: NodeStatus,
    steps: BTreeMap<String, StepDecl>,
}

/// Single-use builder for a [`Snapshot`]. `build` consumes it.
///
/// ```
/// use ensemble_eval_core::snapshot::{DataMap, SnapshotBuilder};
/// use ensemble_eval_core::status::{EnsembleStatus, NodeStatus};
///
/// # fn main() -> Result<(), ensemble_eval_core::snapshot::SnapshotError> {
/// let snapshot = SnapshotBuilder::new()
///     .add_stage("0", NodeStatus::Unknown)?
///     .add_step("0", "0", NodeStatus::Unknown)?
///     .add_job("0", "0", "0", "job0", DataMap::new(), NodeStatus::Unknown)?
///     .build(["0", "1"], EnsembleStatus::Unknown);
/// assert_eq!(snapshot.get_job("1", "0", "0", "0")?.name, "job0");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    stages: BTreeMap<String, StageDecl>,
}

impl SnapshotBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a stage.
    pub fn add_stage(
        mut self,
        stage_id: impl Into<String>,
        status: NodeStatus,
    ) -> Result<Self, SnapshotError> {
        let stage_id = stage_id.into();
        if self.stages.contains_key(&stage_id) {
            return Err(SnapshotError::DuplicateId {
                level: "stage",
                id: stage_id,
            });
        }
        self.stages.insert(
            stage_id,
            StageDecl {
                status,
                steps: BTreeMap::new(),
            },
        );
        Ok(self)
    }

    /// Declare a step under an already declared stage.
    pub fn add_step(
        mut self,
        stage_id: &str,
        step_id: impl Into<String>,
        status: NodeStatus,
    ) -> Result<Self, SnapshotError> {
        let step_id = step_id.into();
        let stage = self.stage_mut(stage_id)?;
        if stage.steps.contains_key(&step_id) {
            return Err(SnapshotError::DuplicateId {
                level: "step",
                id: step_id,
            });
        }
        stage.steps.insert(
            step_id,
            StepDecl {
                status,
                jobs: BTreeMap::new(),
            },
        );
        Ok(self)
    }

    /// Declare a job under an already declared step.
    pub fn add_job(
        mut self,
        stage_id: &str,
        step_id: &str,
        job_id: impl Into<String>,
        name: impl Into<String>,
        data: DataMap,
        status: NodeStatus,
    ) -> Result<Self, SnapshotError> {
        let job_id = job_id.into();
        let step = self
            .stage_mut(stage_id)?
            .steps
            .get_mut(step_id)
            .ok_or_else(|| SnapshotError::UndeclaredParent {
                level: "step",
                id: step_id.to_string(),
            })?;
        if step.jobs.contains_key(&job_id) {
            return Err(SnapshotError::DuplicateId {
                level: "job",
                id: job_id,
            });
        }
        step.jobs.insert(
            job_id,
            JobDecl {
                name: name.into(),
                data,
                status,
            },
        );
        Ok(self)
    }

    fn stage_mut(&mut self, stage_id: &str) -> Result<&mut StageDecl, SnapshotError> {
        self.stages
            .get_mut(stage_id)
            .ok_or_else(|| SnapshotError::UndeclaredParent {
                level: "stage",
                id: stage_id.to_string(),
            })
    }

    /// Replicate the declared schema across every realization id and return
    /// the snapshot. Duplicate realization ids collapse into one.
    pub fn build<I, S>(self, real_ids: I, status: EnsembleStatus) -> Snapshot
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let real_ids: BTreeSet<String> = real_ids.into_iter().map(Into::into).collect();

        let template: BTreeMap<String, Stage> = self
            .stages
            .iter()
            .map(|(stage_id, stage)| {
                let steps = stage
                    .steps
                    .iter()
                    .map(|(step_id, step)| {
                        let jobs = step
                            .jobs
                            .iter()
                            .map(|(job_id, job)| {
                                let record = Job::new(job.name.clone(), job.status, job.data.clone());
                                (job_id.clone(), record)
                            })
                            .collect();
                        (
                            step_id.clone(),
                            Step {
                                status: step.status,
                                jobs,
                            },
                        )
                    })
                    .collect();
                (
                    stage_id.clone(),
                    Stage {
                        status: stage.status,
                        steps,
                    },
                )
            })
            .collect();

        let schema_stages = self
            .stages
            .iter()
            .map(|(stage_id, stage)| {
                let steps = stage
                    .steps
                    .iter()
                    .map(|(step_id, step)| (step_id.clone(), step.jobs.keys().cloned().collect()))
                    .collect();
                (stage_id.clone(), steps)
            })
            .collect();

        let reals = real_ids
            .iter()
            .map(|real_id| {
                (
                    real_id.clone(),
                    Realization {
                        status: NodeStatus::Unknown,
                        active: true,
                        stages: template.clone(),
                    },
                )
            })
            .collect();

        tracing::debug!(
            realizations = real_ids.len(),
            stages = self.stages.len(),
            "snapshot built"
        );

        Snapshot {
            status,
            reals,
            schema: Arc::new(Schema::new(real_ids, schema_stages)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_before_stage_is_rejected_immediately() {
        let err = SnapshotBuilder::new()
            .add_step("0", "0", NodeStatus::Unknown)
            .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::UndeclaredParent { level: "stage", ref id } if id == "0"
        ));
    }

    #[test]
    fn job_before_step_is_rejected_immediately() {
        let err = SnapshotBuilder::new()
            .add_stage("0", NodeStatus::Unknown)
            .and_then(|b| b.add_job("0", "missing", "0", "job0", DataMap::new(), NodeStatus::Unknown))
            .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::UndeclaredParent { level: "step", ref id } if id == "missing"
        ));
    }

    #[test]
    fn duplicate_declarations_are_rejected() {
        let err = SnapshotBuilder::new()
            .add_stage("0", NodeStatus::Unknown)
            .and_then(|b| b.add_stage("0", NodeStatus::Pending))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::DuplicateId { level: "stage", .. }));
    }

    #[test]
    fn build_replicates_schema_with_initial_values() {
        let data = DataMap::from([("queue".to_string(), "LOCAL".into())]);
        let snapshot = SnapshotBuilder::new()
            .add_stage("s", NodeStatus::Pending)
            .and_then(|b| b.add_step("s", "t", NodeStatus::Waiting))
            .and_then(|b| b.add_job("s", "t", "j", "eclipse", data.clone(), NodeStatus::Unknown))
            .unwrap()
            .build(["2", "0", "2"], EnsembleStatus::Starting);

        assert_eq!(snapshot.get_status(), EnsembleStatus::Starting);
        assert_eq!(snapshot.realization_ids().collect::<Vec<_>>(), ["0", "2"]);
        for real in ["0", "2"] {
            let job = snapshot.get_job(real, "s", "t", "j").unwrap();
            assert_eq!(job.name, "eclipse");
            assert_eq!(job.data, data);
            assert_eq!(job.start_time, None);
            assert_eq!(snapshot.get_step(real, "s", "t").unwrap().status, NodeStatus::Waiting);
            assert_eq!(snapshot.get_stage(real, "s").unwrap().status, NodeStatus::Pending);
        }
    }
}
