//! Worker events carried over the in-memory transport into a snapshot.

use chrono::{TimeZone, Utc};

use ensemble_eval_core::prelude::*;
use ensemble_eval_core::source::job_source;
use ensemble_eval_net::ordering::{SequenceError, SequenceGuard};
use ensemble_eval_net::protocol::{Message, MessageEnvelope};
use ensemble_eval_net::traits::EventTransport;
use ensemble_eval_net::{Error, MockTransport};

fn two_job_snapshot() -> Snapshot {
    SnapshotBuilder::new()
        .add_stage("0", NodeStatus::Unknown)
        .and_then(|b| b.add_step("0", "0", NodeStatus::Unknown))
        .and_then(|b| b.add_job("0", "0", "0", "job0", DataMap::new(), NodeStatus::Unknown))
        .and_then(|b| b.add_job("0", "0", "1", "job1", DataMap::new(), NodeStatus::Unknown))
        .unwrap()
        .build(["0", "1"], EnsembleStatus::Running)
}

async fn drain(
    transport: &MockTransport,
    count: usize,
    guard: &mut SequenceGuard,
    partial: &mut PartialSnapshot,
) -> Vec<Error> {
    let mut rejected = Vec::new();
    for _ in 0..count {
        let envelope = transport.recv().await.unwrap();
        if let Err(err) = guard.check(&envelope.sender, envelope.sequence) {
            rejected.push(err.into());
            continue;
        }
        match envelope.decode().unwrap() {
            Message::Event(event) => {
                partial.record_event(&event).unwrap();
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
    rejected
}

#[tokio::test]
async fn worker_events_reach_the_snapshot() {
    let (worker, evaluator) = MockTransport::pair();
    let mut snapshot = two_job_snapshot();
    let source = job_source("ee", "1", "0", "0", "1");
    let started = Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap();

    let events = [
        Event::new(EventKind::JobStart, &source).with_time(started),
        Event::new(EventKind::JobRunning, &source).with_data("memory", 2048),
        Event::new(EventKind::JobSuccess, &source),
    ];
    for (seq, event) in events.iter().enumerate() {
        let envelope = MessageEnvelope::event(event).unwrap().with_sequence(seq as u64);
        worker.send(&envelope).await.unwrap();
    }

    let mut guard = SequenceGuard::new();
    let mut partial = PartialSnapshot::new(&snapshot);
    let rejected = drain(&evaluator, events.len(), &mut guard, &mut partial).await;
    assert!(rejected.is_empty());

    snapshot.merge_event(partial).unwrap();
    let job = snapshot.get_job("1", "0", "0", "1").unwrap();
    assert_eq!(job.status, NodeStatus::Finished);
    assert_eq!(job.start_time, Some(started));
    assert_eq!(job.data["memory"], DataValue::I64(2048));

    // Realization 0 was not addressed.
    let untouched = snapshot.get_job("0", "0", "0", "1").unwrap();
    assert_eq!(untouched.status, NodeStatus::Unknown);
}

#[tokio::test]
async fn resent_envelopes_are_dropped_by_the_guard() {
    let (worker, evaluator) = MockTransport::pair();
    let snapshot = two_job_snapshot();
    let source = job_source("ee", "0", "0", "0", "0");

    let running = MessageEnvelope::event(&Event::new(EventKind::JobRunning, &source))
        .unwrap()
        .with_sequence(5);
    worker.send(&running).await.unwrap();
    worker.send(&running).await.unwrap();

    let mut guard = SequenceGuard::new();
    let mut partial = PartialSnapshot::new(&snapshot);
    let rejected = drain(&evaluator, 2, &mut guard, &mut partial).await;

    assert_eq!(rejected.len(), 1);
    assert!(matches!(
        rejected[0],
        Error::Sequence(SequenceError::Duplicate { seq: 5, .. })
    ));
}

#[tokio::test]
async fn snapshot_update_feeds_a_replica() {
    let (evaluator, monitor) = MockTransport::pair();
    let mut live = two_job_snapshot();
    let mut replica = Snapshot::from_export(live.export()).unwrap();

    let mut partial = PartialSnapshot::new(&live);
    partial
        .update_job("0", "0", "0", "0", JobUpdate::new().status(NodeStatus::Running))
        .unwrap();
    let delta = partial.delta().clone();
    live.merge_event(partial).unwrap();

    evaluator
        .send(&MessageEnvelope::snapshot_update("ee", &delta).unwrap())
        .await
        .unwrap();
    let Message::SnapshotUpdate(received) = monitor.recv().await.unwrap().decode().unwrap() else {
        panic!("expected a snapshot update");
    };
    replica.merge_delta(received).unwrap();

    assert_eq!(replica.export(), live.export());
}

#[tokio::test]
async fn full_snapshot_bootstraps_a_monitor() {
    let (evaluator, monitor) = MockTransport::pair();
    let live = two_job_snapshot();

    evaluator
        .send(&MessageEnvelope::full_snapshot("ee", &live.export()).unwrap())
        .await
        .unwrap();
    let Message::FullSnapshot(export) = monitor.recv().await.unwrap().decode().unwrap() else {
        panic!("expected a full snapshot");
    };
    let replica = Snapshot::from_export(export).unwrap();
    assert_eq!(replica.get_status(), EnsembleStatus::Running);
    assert_eq!(replica.realization_ids().count(), 2);
}
