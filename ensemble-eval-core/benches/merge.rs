//! Merge throughput benchmarks.
//!
//! Measures recording and merging partial snapshots against ensembles of
//! increasing size, plus delta wire encoding.

#![allow(missing_docs)]

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use ensemble_eval_core::snapshot::{DataMap, JobUpdate, PartialSnapshot, Snapshot, SnapshotBuilder};
use ensemble_eval_core::status::{EnsembleStatus, NodeStatus};

const JOBS_PER_STEP: usize = 8;

fn ensemble(realizations: usize) -> Snapshot {
    let mut builder = SnapshotBuilder::new()
        .add_stage("0", NodeStatus::Unknown)
        .and_then(|b| b.add_step("0", "0", NodeStatus::Unknown))
        .unwrap();
    for job in 0..JOBS_PER_STEP {
        builder = builder
            .add_job("0", "0", job.to_string(), format!("job{job}"), DataMap::new(), NodeStatus::Unknown)
            .unwrap();
    }
    builder.build((0..realizations).map(|r| r.to_string()), EnsembleStatus::Unknown)
}

/// One update per job in every realization.
fn full_sweep(snapshot: &Snapshot, realizations: usize) -> PartialSnapshot {
    let started = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
    let mut partial = PartialSnapshot::new(snapshot);
    for real in 0..realizations {
        let real = real.to_string();
        for job in 0..JOBS_PER_STEP {
            let update = JobUpdate::new()
                .status(NodeStatus::Running)
                .start_time(started)
                .data("memory", 1024 * job as i64);
            partial
                .update_job(&real, "0", "0", &job.to_string(), update)
                .unwrap();
        }
    }
    partial
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot/merge_event");

    for realizations in [10usize, 100, 1000] {
        let snapshot = ensemble(realizations);
        group.bench_with_input(
            BenchmarkId::from_parameter(realizations),
            &realizations,
            |b, &realizations| {
                b.iter_batched(
                    || (snapshot.clone(), full_sweep(&snapshot, realizations)),
                    |(mut snapshot, partial)| {
                        snapshot.merge_event(black_box(partial)).unwrap();
                        snapshot
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot/record");

    for realizations in [10usize, 100, 1000] {
        let snapshot = ensemble(realizations);
        group.bench_with_input(
            BenchmarkId::from_parameter(realizations),
            &realizations,
            |b, &realizations| {
                b.iter(|| full_sweep(black_box(&snapshot), realizations));
            },
        );
    }

    group.finish();
}

fn bench_delta_encode(c: &mut Criterion) {
    let snapshot = ensemble(100);
    let partial = full_sweep(&snapshot, 100);

    c.bench_function("snapshot/delta_to_json", |b| {
        b.iter(|| black_box(partial.delta()).to_json().unwrap());
    });
}

criterion_group!(benches, bench_merge, bench_record, bench_delta_encode);
criterion_main!(benches);
