//! Consumer-side progress aggregation.
//!
//! The snapshot never rolls job states up into its parents. Consumers that
//! want totals compute them from an export.

use std::collections::HashMap;
use std::fmt;

use ensemble_eval_core::snapshot::SnapshotExport;
use ensemble_eval_core::status::{EnsembleStatus, NodeStatus};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProgressSummary {
    pub status: EnsembleStatus,
    pub realizations: usize,
    pub active_realizations: usize,
    pub realizations_by_status: HashMap<NodeStatus, usize>,
    pub jobs: usize,
    pub jobs_by_status: HashMap<NodeStatus, usize>,
}

impl ProgressSummary {
    /// Count realizations and jobs by status.
    pub fn from_snapshot(export: &SnapshotExport) -> Self {
        let mut summary = Self {
            status: export.status,
            realizations: export.reals.len(),
            active_realizations: 0,
            realizations_by_status: HashMap::new(),
            jobs: 0,
            jobs_by_status: HashMap::new(),
        };

        for real in export.reals.values() {
            if real.active {
                summary.active_realizations += 1;
            }
            *summary.realizations_by_status.entry(real.status).or_default() += 1;

            let jobs = real
                .stages
                .values()
                .flat_map(|stage| stage.steps.values())
                .flat_map(|step| step.jobs.values());
            for job in jobs {
                summary.jobs += 1;
                *summary.jobs_by_status.entry(job.status).or_default() += 1;
            }
        }
        summary
    }

    /// Jobs currently in `status`.
    pub fn jobs_in(&self, status: NodeStatus) -> usize {
        self.jobs_by_status.get(&status).copied().unwrap_or(0)
    }

    /// Share of jobs that finished successfully, in `[0, 1]`.
    pub fn finished_fraction(&self) -> f64 {
        if self.jobs == 0 {
            return 0.0;
        }
        self.jobs_in(NodeStatus::Finished) as f64 / self.jobs as f64
    }

    /// True once every job has reached a terminal state.
    pub fn all_jobs_done(&self) -> bool {
        NodeStatus::ALL
            .iter()
            .filter(|status| status.is_terminal())
            .map(|status| self.jobs_in(*status))
            .sum::<usize>()
            == self.jobs
    }
}

impl fmt::Display for ProgressSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ensemble {}: {} realizations ({} active), {} jobs, {:.1}% finished",
            self.status,
            self.realizations,
            self.active_realizations,
            self.jobs,
            self.finished_fraction() * 100.0
        )?;
        for status in NodeStatus::ALL {
            let count = self.jobs_in(status);
            if count > 0 {
                writeln!(f, "  {status:<10} {count}")?;
            }
        }
        Ok(())
    }
}
