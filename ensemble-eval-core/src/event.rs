//! Worker status events and their translation into partial snapshots.
//!
//! An event names where it came from (an event-source address, see
//! [`crate::source`]) and what happened. Recording it resolves the address
//! and writes the matching update at the depth the kind requires.

use chrono::{DateTime, Utc};

use crate::snapshot::{DataMap, DataValue, JobUpdate, PartialSnapshot, SnapshotError};
use crate::source::SourceIds;
use crate::status::{EnsembleStatus, NodeStatus};

/// What an event reports. Closed set; the wire name is the snake_case variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobStart,
    JobRunning,
    JobSuccess,
    JobFailure,
    StepWaiting,
    StepPending,
    StepRunning,
    StepSuccess,
    StepFailure,
    EnsembleStarting,
    EnsembleStarted,
    EnsembleStopped,
    EnsembleCancelled,
    EnsembleFailed,
}

/// Hierarchy level an event kind addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Ensemble,
    Step,
    Job,
}

/// The level an event kind addresses together with the status it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    Ensemble(EnsembleStatus),
    Step(NodeStatus),
    Job(NodeStatus),
}

impl EventKind {
    /// Level and status this kind writes.
    pub const fn target(&self) -> EventTarget {
        match self {
            EventKind::JobStart => EventTarget::Job(NodeStatus::Pending),
            EventKind::JobRunning => EventTarget::Job(NodeStatus::Running),
            EventKind::JobSuccess => EventTarget::Job(NodeStatus::Finished),
            EventKind::JobFailure => EventTarget::Job(NodeStatus::Failed),
            EventKind::StepWaiting => EventTarget::Step(NodeStatus::Waiting),
            EventKind::StepPending => EventTarget::Step(NodeStatus::Pending),
            EventKind::StepRunning => EventTarget::Step(NodeStatus::Running),
            EventKind::StepSuccess => EventTarget::Step(NodeStatus::Finished),
            EventKind::StepFailure => EventTarget::Step(NodeStatus::Failed),
            EventKind::EnsembleStarting => EventTarget::Ensemble(EnsembleStatus::Starting),
            EventKind::EnsembleStarted => EventTarget::Ensemble(EnsembleStatus::Running),
            EventKind::EnsembleStopped => EventTarget::Ensemble(EnsembleStatus::Stopped),
            EventKind::EnsembleCancelled => EventTarget::Ensemble(EnsembleStatus::Cancelled),
            EventKind::EnsembleFailed => EventTarget::Ensemble(EnsembleStatus::Failed),
        }
    }

    /// Hierarchy level this kind addresses.
    pub const fn level(&self) -> EventLevel {
        match self.target() {
            EventTarget::Ensemble(_) => EventLevel::Ensemble,
            EventTarget::Step(_) => EventLevel::Step,
            EventTarget::Job(_) => EventLevel::Job,
        }
    }

    /// Node status implied by a job or step event.
    pub const fn node_status(&self) -> Option<NodeStatus> {
        match self.target() {
            EventTarget::Step(status) | EventTarget::Job(status) => Some(status),
            EventTarget::Ensemble(_) => None,
        }
    }

    /// Ensemble status implied by an ensemble event.
    pub const fn ensemble_status(&self) -> Option<EnsembleStatus> {
        match self.target() {
            EventTarget::Ensemble(status) => Some(status),
            EventTarget::Step(_) | EventTarget::Job(_) => None,
        }
    }
}

/// A status event emitted by a worker.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub source: String,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "DataMap::is_empty")]
    pub data: DataMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl Event {
    /// Create an event with no payload.
    pub fn new(kind: EventKind, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind,
            time: None,
            data: DataMap::new(),
            error: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Set the event time.
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Add one data key.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Set the error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set the stdout and stderr paths.
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = Some(stdout.into());
        self.stderr = Some(stderr.into());
        self
    }

    fn job_update(&self, status: NodeStatus) -> JobUpdate {
        let mut update = JobUpdate::new().status(status).extend_data(self.data.clone());
        match self.kind {
            EventKind::JobStart => {
                if let Some(time) = self.time {
                    update = update.start_time(time);
                }
                if let Some(stdout) = &self.stdout {
                    update = update.stdout(stdout.clone());
                }
                if let Some(stderr) = &self.stderr {
                    update = update.stderr(stderr.clone());
                }
            }
            EventKind::JobSuccess | EventKind::JobFailure => {
                if let Some(time) = self.time {
                    update = update.end_time(time);
                }
                if let Some(error) = &self.error {
                    update = update.error(error.clone());
                }
            }
            _ => {}
        }
        update
    }
}

impl PartialSnapshot {
    /// Record the update an event implies.
    ///
    /// Fails with [`SnapshotError::UnresolvedSource`] when the source address
    /// does not reach the level the event kind addresses, or with a schema
    /// error when the resolved path does not exist.
    pub fn record_event(&mut self, event: &Event) -> Result<&mut Self, SnapshotError> {
        let ids = SourceIds::parse(&event.source);
        let unresolved = |required| SnapshotError::UnresolvedSource {
            source_addr: event.source.clone(),
            required,
        };

        match event.kind.target() {
            EventTarget::Ensemble(status) => Ok(self.update_status(status)),
            EventTarget::Step(status) => {
                let (Some(real), Some(stage), Some(step)) = (ids.real, ids.stage, ids.step) else {
                    return Err(unresolved("step"));
                };
                self.update_step(real, stage, step, status)
            }
            EventTarget::Job(status) => {
                let (Some(real), Some(stage), Some(step), Some(job)) =
                    (ids.real, ids.stage, ids.step, ids.job)
                else {
                    return Err(unresolved("job"));
                };
                self.update_job(real, stage, step, job, event.job_update(status))
            }
        }
    }
}
