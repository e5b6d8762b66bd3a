//! # Ensemble Evaluator Runtime
//!
//! Tokio actor that owns the live snapshot.
//!
//! All writers (worker events, partial snapshots, deltas, commands) send to a
//! single reconciler task which applies them in arrival order, fans merged
//! deltas out to subscribers and tracks the control state that `Pause` and
//! `Terminate` commands drive.

#![forbid(unsafe_code)]

mod reconciler;

pub use reconciler::{Reconciler, ReconcilerHandle};

use ensemble_eval_net::ordering::{
    SequenceConfigError, DEFAULT_MAX_TRACKED_SOURCES, DEFAULT_SEQUENCE_WINDOW,
};
use ensemble_eval_net::protocol::MessageType;

/// Result type for runtime operations
pub type Result<T> = core::result::Result<T, RuntimeError>;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("reconciler is not running")]
    Stopped,

    #[error("update rejected: {0}")]
    Rejected(#[from] ensemble_eval_core::snapshot::SnapshotError),

    #[error("envelope rejected: {0}")]
    Envelope(#[from] ensemble_eval_net::Error),

    #[error("{0:?} messages are not accepted by the reconciler")]
    UnexpectedMessage(MessageType),

    #[error("invalid reconciler configuration: {0}")]
    Config(#[from] SequenceConfigError),
}

/// Execution state driven by control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlState {
    Running,
    /// Dispatch should hold; updates from jobs already running are still merged.
    Paused,
    Terminated,
}

/// Reconciler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Bounded inbox size; senders wait when it is full
    pub inbox_capacity: usize,
    /// Per-subscriber delta buffer; slow subscribers observe a lag
    pub subscriber_capacity: usize,
    /// Drop duplicate and stale event and delta envelopes per sender.
    ///
    /// A sequence number is only consumed once its envelope has been merged,
    /// so an envelope rejected by the schema can be resent unchanged. Command
    /// envelopes are never sequenced.
    pub enforce_sequencing: bool,
    pub sequence_window: u64,
    pub max_tracked_sources: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 1024,
            subscriber_capacity: 256,
            enforce_sequencing: false,
            sequence_window: DEFAULT_SEQUENCE_WINDOW,
            max_tracked_sources: DEFAULT_MAX_TRACKED_SOURCES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_eval_core::prelude::*;
    use ensemble_eval_core::source::{ensemble_source, job_source};
    use ensemble_eval_net::protocol::MessageEnvelope;

    fn snapshot() -> Snapshot {
        SnapshotBuilder::new()
            .add_stage("0", NodeStatus::Unknown)
            .and_then(|b| b.add_step("0", "0", NodeStatus::Unknown))
            .and_then(|b| b.add_job("0", "0", "0", "job0", DataMap::new(), NodeStatus::Unknown))
            .unwrap()
            .build(["0", "1"], EnsembleStatus::Unknown)
    }

    #[tokio::test]
    async fn events_are_merged_in_arrival_order() {
        let (handle, task) = Reconciler::spawn(snapshot(), ReconcilerConfig::default()).unwrap();
        let source = job_source("ee", "1", "0", "0", "0");

        handle
            .submit_event(Event::new(EventKind::JobRunning, &source))
            .await
            .unwrap();
        handle
            .submit_event(Event::new(EventKind::JobSuccess, &source))
            .await
            .unwrap();
        assert_eq!(
            handle.job("1", "0", "0", "0").await.unwrap().status,
            NodeStatus::Finished
        );

        handle.shutdown().await.unwrap();
        let last = task.await.unwrap();
        assert_eq!(last.get_job("0", "0", "0", "0").unwrap().status, NodeStatus::Unknown);
    }

    #[tokio::test]
    async fn rejected_update_leaves_the_snapshot_untouched() {
        let (handle, _task) = Reconciler::spawn(snapshot(), ReconcilerConfig::default()).unwrap();
        let before = handle.snapshot().await.unwrap();

        let err = handle
            .submit_event(Event::new(
                EventKind::JobFailure,
                job_source("ee", "7", "0", "0", "0"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Rejected(_)));
        assert_eq!(handle.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn subscribers_receive_merged_deltas() {
        let (handle, _task) = Reconciler::spawn(snapshot(), ReconcilerConfig::default()).unwrap();
        let mut updates = handle.subscribe();

        handle
            .submit_event(Event::new(EventKind::EnsembleStarted, ensemble_source("ee")))
            .await
            .unwrap();

        let delta = updates.recv().await.unwrap();
        assert_eq!(delta.status, Some(EnsembleStatus::Running));
        assert_eq!(handle.status().await.unwrap(), EnsembleStatus::Running);
    }

    #[tokio::test]
    async fn pause_keeps_merging() {
        let (handle, _task) = Reconciler::spawn(snapshot(), ReconcilerConfig::default()).unwrap();
        let control = handle.control();

        handle.send_command(Command::pause()).await.unwrap();
        assert_eq!(*control.borrow(), ControlState::Paused);

        handle
            .submit_event(Event::new(
                EventKind::JobRunning,
                job_source("ee", "0", "0", "0", "0"),
            ))
            .await
            .unwrap();
        assert_eq!(
            handle.job("0", "0", "0", "0").await.unwrap().status,
            NodeStatus::Running
        );
    }

    #[tokio::test]
    async fn terminate_stops_the_actor() {
        let (handle, task) = Reconciler::spawn(snapshot(), ReconcilerConfig::default()).unwrap();
        let control = handle.control();

        let envelope = MessageEnvelope::command("controller", Command::terminate());
        handle.submit_envelope(envelope).await.unwrap();
        assert_eq!(*control.borrow(), ControlState::Terminated);

        let final_snapshot = task.await.unwrap();
        assert_eq!(final_snapshot.realization_ids().count(), 2);
        assert!(matches!(handle.status().await, Err(RuntimeError::Stopped)));
    }

    #[tokio::test]
    async fn sequencing_drops_resent_envelopes() {
        let config = ReconcilerConfig {
            enforce_sequencing: true,
            ..ReconcilerConfig::default()
        };
        let (handle, _task) = Reconciler::spawn(snapshot(), config).unwrap();
        let event = Event::new(EventKind::JobRunning, job_source("ee", "0", "0", "0", "0"));
        let envelope = MessageEnvelope::event(&event).unwrap().with_sequence(3);

        handle.submit_envelope(envelope.clone()).await.unwrap();
        let err = handle.submit_envelope(envelope).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Envelope(ensemble_eval_net::Error::Sequence(_))
        ));
    }

    #[tokio::test]
    async fn zero_source_capacity_is_a_config_error() {
        let config = ReconcilerConfig {
            enforce_sequencing: true,
            max_tracked_sources: 0,
            ..ReconcilerConfig::default()
        };
        assert!(matches!(
            Reconciler::spawn(snapshot(), config),
            Err(RuntimeError::Config(SequenceConfigError::ZeroCapacity))
        ));
    }

    fn sequenced() -> ReconcilerConfig {
        ReconcilerConfig {
            enforce_sequencing: true,
            ..ReconcilerConfig::default()
        }
    }

    #[tokio::test]
    async fn sequencing_lets_every_command_through() {
        let (handle, task) = Reconciler::spawn(snapshot(), sequenced()).unwrap();
        let control = handle.control();

        handle
            .submit_envelope(MessageEnvelope::command("controller", Command::pause()))
            .await
            .unwrap();
        assert_eq!(*control.borrow(), ControlState::Paused);

        handle
            .submit_envelope(MessageEnvelope::command("controller", Command::terminate()))
            .await
            .unwrap();
        assert_eq!(*control.borrow(), ControlState::Terminated);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn rejected_envelope_does_not_consume_its_sequence() {
        let (handle, _task) = Reconciler::spawn(snapshot(), sequenced()).unwrap();
        let source = job_source("ee", "0", "0", "0", "0");

        // Stage "9" is not in the schema.
        let mut bad = SnapshotDelta::default();
        bad.reals
            .entry("0".to_string())
            .or_default()
            .stages
            .entry("9".to_string())
            .or_default()
            .status = Some(NodeStatus::Failed);
        let envelope = MessageEnvelope::snapshot_update(&source, &bad)
            .unwrap()
            .with_sequence(1);
        assert!(matches!(
            handle.submit_envelope(envelope).await,
            Err(RuntimeError::Rejected(_))
        ));

        let event = Event::new(EventKind::JobRunning, &source);
        let resent = MessageEnvelope::event(&event).unwrap().with_sequence(1);
        handle.submit_envelope(resent.clone()).await.unwrap();
        assert_eq!(
            handle.job("0", "0", "0", "0").await.unwrap().status,
            NodeStatus::Running
        );
        assert!(matches!(
            handle.submit_envelope(resent).await,
            Err(RuntimeError::Envelope(ensemble_eval_net::Error::Sequence(_)))
        ));
    }
}
