//! Sparse update records and the delta wire form.
//!
//! A [`SnapshotDelta`] mirrors the snapshot hierarchy but only carries the
//! fields an update actually mentions. Omitted fields never overwrite
//! existing values. Nullable job fields use [`Patch`] so that "set to null"
//! stays distinguishable from "not supplied".

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::model::{DataMap, DataValue, Job};
use super::SnapshotError;
use crate::status::{EnsembleStatus, NodeStatus};

/// A field update: either leave the current value alone or overwrite it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Keep,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    /// True when the field was not supplied.
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// The supplied value, if any.
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Keep => None,
            Patch::Set(value) => Some(value),
        }
    }

    /// Overwrite `target` if this patch carries a value.
    pub fn apply_to(self, target: &mut T) {
        if let Patch::Set(value) = self {
            *target = value;
        }
    }

    /// Fold a later patch on top of this one (last write wins).
    pub fn absorb(&mut self, later: Patch<T>) {
        if let Patch::Set(value) = later {
            *self = Patch::Set(value);
        }
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            // Only reachable when the field is not marked `skip_serializing_if`.
            Patch::Keep => serializer.serialize_unit(),
            Patch::Set(value) => value.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

/// A sparse update to one job.
///
/// ```
/// use ensemble_eval_core::snapshot::JobUpdate;
/// use ensemble_eval_core::status::NodeStatus;
///
/// let update = JobUpdate::new()
///     .status(NodeStatus::Running)
///     .data("memory", 1000);
/// assert!(update.end_time.is_keep());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub start_time: Patch<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub end_time: Patch<Option<DateTime<Utc>>>,
    /// Merged key by key into the job's data; never replaces it wholesale.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: DataMap,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub error: Patch<Option<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub stdout: Patch<Option<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub stderr: Patch<Option<String>>,
}

impl JobUpdate {
    /// Create an update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the job status.
    pub fn status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the start time.
    pub fn start_time(mut self, time: DateTime<Utc>) -> Self {
        self.start_time = Patch::Set(Some(time));
        self
    }

    /// Set the end time.
    pub fn end_time(mut self, time: DateTime<Utc>) -> Self {
        self.end_time = Patch::Set(Some(time));
        self
    }

    /// Insert or overwrite one data key.
    pub fn data(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Insert or overwrite several data keys.
    pub fn extend_data(mut self, data: DataMap) -> Self {
        self.data.extend(data);
        self
    }

    /// Set the error message.
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Patch::Set(Some(error.into()));
        self
    }

    /// Explicitly reset the error to null.
    pub fn clear_error(mut self) -> Self {
        self.error = Patch::Set(None);
        self
    }

    /// Set the stdout path.
    pub fn stdout(mut self, path: impl Into<String>) -> Self {
        self.stdout = Patch::Set(Some(path.into()));
        self
    }

    /// Set the stderr path.
    pub fn stderr(mut self, path: impl Into<String>) -> Self {
        self.stderr = Patch::Set(Some(path.into()));
        self
    }

    /// True when no field is supplied.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.start_time.is_keep()
            && self.end_time.is_keep()
            && self.data.is_empty()
            && self.error.is_keep()
            && self.stdout.is_keep()
            && self.stderr.is_keep()
    }

    /// Fold a later update into this one, field by field.
    pub fn absorb(&mut self, later: JobUpdate) {
        if later.status.is_some() {
            self.status = later.status;
        }
        self.start_time.absorb(later.start_time);
        self.end_time.absorb(later.end_time);
        self.data.extend(later.data);
        self.error.absorb(later.error);
        self.stdout.absorb(later.stdout);
        self.stderr.absorb(later.stderr);
    }

    pub(crate) fn apply(self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        self.start_time.apply_to(&mut job.start_time);
        self.end_time.apply_to(&mut job.end_time);
        job.data.extend(self.data);
        self.error.apply_to(&mut job.error);
        self.stdout.apply_to(&mut job.stdout);
        self.stderr.apply_to(&mut job.stderr);
    }
}

/// Changes to one step and its jobs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub jobs: BTreeMap<String, JobUpdate>,
}

/// Changes to one stage and its steps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StageDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub steps: BTreeMap<String, StepDelta>,
}

/// Changes to one realization and its stages.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RealizationDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stages: BTreeMap<String, StageDelta>,
}

/// Wire form of a partial snapshot: identifier path → changed fields.
///
/// Decoding needs no snapshot; paths are checked against a schema only when
/// the delta is merged or bound with `PartialSnapshot::from_delta`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EnsembleStatus>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reals: BTreeMap<String, RealizationDelta>,
}

impl SnapshotDelta {
    /// True when the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.reals.is_empty()
    }

    /// Number of distinct jobs this delta touches.
    pub fn job_count(&self) -> usize {
        self.reals
            .values()
            .flat_map(|real| real.stages.values())
            .flat_map(|stage| stage.steps.values())
            .map(|step| step.jobs.len())
            .sum()
    }

    pub(crate) fn realization_mut(&mut self, real: &str) -> &mut RealizationDelta {
        self.reals.entry(real.to_string()).or_default()
    }

    pub(crate) fn stage_mut(&mut self, real: &str, stage: &str) -> &mut StageDelta {
        self.realization_mut(real)
            .stages
            .entry(stage.to_string())
            .or_default()
    }

    pub(crate) fn step_mut(&mut self, real: &str, stage: &str, step: &str) -> &mut StepDelta {
        self.stage_mut(real, stage)
            .steps
            .entry(step.to_string())
            .or_default()
    }

    /// Structured form keyed by id path.
    pub fn to_dict(&self) -> Result<serde_json::Value, SnapshotError> {
        serde_json::to_value(self).map_err(SnapshotError::Encode)
    }

    /// Decode the structured form; paths are not checked here.
    pub fn from_dict(value: serde_json::Value) -> Result<Self, SnapshotError> {
        serde_json::from_value(value).map_err(SnapshotError::Decode)
    }

    /// Encode as a JSON string.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(SnapshotError::Encode)
    }

    /// Decode from a JSON string.
    pub fn from_json(s: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(s).map_err(SnapshotError::Decode)
    }
}
