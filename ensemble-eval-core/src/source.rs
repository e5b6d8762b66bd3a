//! Event-source address parsing.
//!
//! A worker tags every event with a slash-delimited address:
//!
//! ```text
//! /ert/ee/<ensemble_id>/real/<real_id>/stage/<stage_id>/step/<step_id>/job/<job_id>
//! ```
//!
//! Any suffix from `stage` onward may be absent, which denotes an update at a
//! coarser granularity. The address is parsed once into [`SourceIds`]; the
//! free `get_*_id` functions are thin accessors over that parse so callers can
//! ask for a single level without handling the others.
//!
//! Parsing never fails. A level that cannot be resolved (segment missing, an
//! ancestor missing, or segments out of nesting order) is reported as `None`.

use core::fmt;

/// Fixed address prefix naming the ensemble evaluator.
pub const SOURCE_PREFIX: &str = "/ert/ee";

const REAL: &str = "real";
const STAGE: &str = "stage";
const STEP: &str = "step";
const JOB: &str = "job";

/// Nesting order of the hierarchical segments.
const LEVELS: [&str; 4] = [REAL, STAGE, STEP, JOB];

/// Identifiers resolved from one event-source address.
///
/// Borrowed from the address; nothing is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceIds<'a> {
    pub ensemble: Option<&'a str>,
    pub real: Option<&'a str>,
    pub stage: Option<&'a str>,
    pub step: Option<&'a str>,
    pub job: Option<&'a str>,
}

impl<'a> SourceIds<'a> {
    /// Parse an event-source address.
    pub fn parse(source: &'a str) -> Self {
        let segments: Vec<&'a str> = source.split('/').filter(|s| !s.is_empty()).collect();
        let prefix: Vec<&str> = SOURCE_PREFIX.split('/').filter(|s| !s.is_empty()).collect();

        let mut ids = SourceIds::default();

        let rest = match segments.strip_prefix(&prefix[..]) {
            // No ensemble id: the hierarchy starts right after the prefix.
            Some(rest @ [REAL, _, ..]) => rest,
            Some([ensemble, rest @ ..]) => {
                ids.ensemble = Some(*ensemble);
                rest
            }
            _ => &segments[..],
        };

        // The hierarchy is anchored at the first `real` segment that carries a value.
        let Some(start) = rest.windows(2).position(|w| w[0] == REAL) else {
            return ids;
        };

        let mut pairs = rest[start..].chunks_exact(2);
        for level in LEVELS {
            match pairs.next() {
                Some(&[key, value]) if key == level => ids.set(level, value),
                _ => break,
            }
        }
        ids
    }

    fn set(&mut self, level: &str, value: &'a str) {
        match level {
            REAL => self.real = Some(value),
            STAGE => self.stage = Some(value),
            STEP => self.step = Some(value),
            JOB => self.job = Some(value),
            _ => {}
        }
    }

    /// Number of hierarchy levels resolved (0 = ensemble only, 4 = job).
    pub fn depth(&self) -> usize {
        [self.real, self.stage, self.step, self.job]
            .iter()
            .take_while(|id| id.is_some())
            .count()
    }
}

/// Formats the canonical address, stopping at the first unresolved level.
impl fmt::Display for SourceIds<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SOURCE_PREFIX)?;
        let Some(ensemble) = self.ensemble else {
            return Ok(());
        };
        write!(f, "/{ensemble}")?;
        for (level, id) in LEVELS.iter().zip([self.real, self.stage, self.step, self.job]) {
            match id {
                Some(id) => write!(f, "/{level}/{id}")?,
                None => break,
            }
        }
        Ok(())
    }
}

/// Build the address of a job.
pub fn job_source(ensemble: &str, real: &str, stage: &str, step: &str, job: &str) -> String {
    SourceIds {
        ensemble: Some(ensemble),
        real: Some(real),
        stage: Some(stage),
        step: Some(step),
        job: Some(job),
    }
    .to_string()
}

/// Build the address of a step.
pub fn step_source(ensemble: &str, real: &str, stage: &str, step: &str) -> String {
    SourceIds {
        ensemble: Some(ensemble),
        real: Some(real),
        stage: Some(stage),
        step: Some(step),
        job: None,
    }
    .to_string()
}

/// Build the address of the ensemble itself.
pub fn ensemble_source(ensemble: &str) -> String {
    SourceIds {
        ensemble: Some(ensemble),
        ..SourceIds::default()
    }
    .to_string()
}

/// Ensemble id of `source`, if present.
pub fn get_ensemble_id(source: &str) -> Option<&str> {
    SourceIds::parse(source).ensemble
}

/// Realization id of `source`, if present.
pub fn get_real_id(source: &str) -> Option<&str> {
    SourceIds::parse(source).real
}

/// Stage id of `source`, if present.
pub fn get_stage_id(source: &str) -> Option<&str> {
    SourceIds::parse(source).stage
}

/// Step id of `source`, if present.
pub fn get_step_id(source: &str) -> Option<&str> {
    SourceIds::parse(source).step
}

/// Job id of `source`, if present.
pub fn get_job_id(source: &str) -> Option<&str> {
    SourceIds::parse(source).job
}
