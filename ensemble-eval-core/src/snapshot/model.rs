//! Node records of the snapshot tree and the fixed schema they are built from.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::delta::SnapshotDelta;
use super::SnapshotError;
use crate::status::{EnsembleStatus, NodeStatus};

/// A scalar carried in a job's `data` mapping (resource metrics and the like).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
}

/// Job data (stable ordering via BTreeMap).
pub type DataMap = BTreeMap<String, DataValue>;

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::I64(i64::from(v))
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::I64(v)
    }
}

impl From<u64> for DataValue {
    fn from(v: u64) -> Self {
        DataValue::U64(v)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::F64(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Str(v.to_string())
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Str(v)
    }
}

/// The leaf unit of work.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Job {
    /// Human-readable name; fixed at build time.
    pub name: String,
    pub status: NodeStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: DataMap,
    pub error: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl Job {
    pub(crate) fn new(name: String, status: NodeStatus, data: DataMap) -> Self {
        Self {
            name,
            status,
            start_time: None,
            end_time: None,
            data,
            error: None,
            stdout: None,
            stderr: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Step {
    pub status: NodeStatus,
    #[serde(default)]
    pub jobs: BTreeMap<String, Job>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stage {
    pub status: NodeStatus,
    #[serde(default)]
    pub steps: BTreeMap<String, Step>,
}

/// One independent run instance within the ensemble.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Realization {
    pub status: NodeStatus,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub stages: BTreeMap<String, Stage>,
}

fn default_active() -> bool {
    true
}

/// Full-tree form of a snapshot, for attaching a new consumer or persisting.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SnapshotExport {
    pub status: EnsembleStatus,
    #[serde(default)]
    pub reals: BTreeMap<String, Realization>,
}

type StepIds = BTreeSet<String>;
type StageIds = BTreeMap<String, StepIds>;

/// Identities fixed at build time: realization ids plus the stage/step/job
/// template replicated under each realization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Schema {
    reals: BTreeSet<String>,
    stages: BTreeMap<String, StageIds>,
}

impl Schema {
    pub(crate) fn new(reals: BTreeSet<String>, stages: BTreeMap<String, StageIds>) -> Self {
        Self { reals, stages }
    }

    /// Recover the schema from a full tree. Every realization must carry the
    /// same stage/step/job identities.
    pub(crate) fn from_realizations(
        reals: &BTreeMap<String, Realization>,
    ) -> Result<Self, SnapshotError> {
        let mut template: Option<BTreeMap<String, StageIds>> = None;
        for (real_id, real) in reals {
            let shape: BTreeMap<String, StageIds> = real
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
            match &template {
                None => template = Some(shape),
                Some(expected) if *expected == shape => {}
                Some(_) => {
                    return Err(SnapshotError::SchemaMismatch {
                        real: real_id.clone(),
                    })
                }
            }
        }
        Ok(Self {
            reals: reals.keys().cloned().collect(),
            stages: template.unwrap_or_default(),
        })
    }

    pub(crate) fn check_real(&self, real: &str) -> Result<(), SnapshotError> {
        if self.reals.contains(real) {
            Ok(())
        } else {
            Err(SnapshotError::UnknownRealization {
                real: real.to_string(),
            })
        }
    }

    fn stage(&self, real: &str, stage: &str) -> Result<&StageIds, SnapshotError> {
        self.check_real(real)?;
        self.stages
            .get(stage)
            .ok_or_else(|| SnapshotError::UnknownStage {
                real: real.to_string(),
                stage: stage.to_string(),
            })
    }

    fn step(&self, real: &str, stage: &str, step: &str) -> Result<&StepIds, SnapshotError> {
        self.stage(real, stage)?
            .get(step)
            .ok_or_else(|| SnapshotError::UnknownStep {
                real: real.to_string(),
                stage: stage.to_string(),
                step: step.to_string(),
            })
    }

    pub(crate) fn check_stage(&self, real: &str, stage: &str) -> Result<(), SnapshotError> {
        self.stage(real, stage).map(|_| ())
    }

    pub(crate) fn check_step(
        &self,
        real: &str,
        stage: &str,
        step: &str,
    ) -> Result<(), SnapshotError> {
        self.step(real, stage, step).map(|_| ())
    }

    pub(crate) fn check_job(
        &self,
        real: &str,
        stage: &str,
        step: &str,
        job: &str,
    ) -> Result<(), SnapshotError> {
        if self.step(real, stage, step)?.contains(job) {
            Ok(())
        } else {
            Err(SnapshotError::UnknownJob {
                real: real.to_string(),
                stage: stage.to_string(),
                step: step.to_string(),
                job: job.to_string(),
            })
        }
    }

    /// Check every path a delta references.
    pub(crate) fn validate(&self, delta: &SnapshotDelta) -> Result<(), SnapshotError> {
        for (real_id, real) in &delta.reals {
            self.check_real(real_id)?;
            for (stage_id, stage) in &real.stages {
                self.check_stage(real_id, stage_id)?;
                for (step_id, step) in &stage.steps {
                    self.check_step(real_id, stage_id, step_id)?;
                    for job_id in step.jobs.keys() {
                        self.check_job(real_id, stage_id, step_id, job_id)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realization(job_ids: &[&str]) -> Realization {
        let jobs = job_ids
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    Job::new(format!("job{id}"), NodeStatus::Unknown, DataMap::new()),
                )
            })
            .collect();
        let step = Step {
            status: NodeStatus::Unknown,
            jobs,
        };
        let stage = Stage {
            status: NodeStatus::Unknown,
            steps: BTreeMap::from([("0".to_string(), step)]),
        };
        Realization {
            status: NodeStatus::Unknown,
            active: true,
            stages: BTreeMap::from([("0".to_string(), stage)]),
        }
    }

    #[test]
    fn schema_from_uniform_tree() {
        let reals = BTreeMap::from([
            ("0".to_string(), realization(&["0", "1"])),
            ("4".to_string(), realization(&["0", "1"])),
        ]);
        let schema = Schema::from_realizations(&reals).unwrap();
        assert!(schema.check_job("4", "0", "0", "1").is_ok());
        assert!(matches!(
            schema.check_job("4", "0", "0", "2"),
            Err(SnapshotError::UnknownJob { .. })
        ));
        assert!(matches!(
            schema.check_stage("2", "0"),
            Err(SnapshotError::UnknownRealization { .. })
        ));
    }

    #[test]
    fn schema_rejects_divergent_realizations() {
        let reals = BTreeMap::from([
            ("0".to_string(), realization(&["0", "1"])),
            ("1".to_string(), realization(&["0"])),
        ]);
        assert!(matches!(
            Schema::from_realizations(&reals),
            Err(SnapshotError::SchemaMismatch { real }) if real == "1"
        ));
    }

    #[test]
    fn data_values_deserialize_untagged() {
        let data: DataMap =
            serde_json::from_str(r#"{"memory": 1000, "ratio": 0.5, "host": "n1", "gpu": null}"#)
                .unwrap();
        assert_eq!(data["memory"], DataValue::I64(1000));
        assert_eq!(data["ratio"], DataValue::F64(0.5));
        assert_eq!(data["host"], DataValue::from("n1"));
        assert_eq!(data["gpu"], DataValue::Null);
    }
}
