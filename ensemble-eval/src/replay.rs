//! Offline replay of recorded worker events onto a saved snapshot.
//!
//! Events are newline-delimited JSON, one [`Event`] per line, applied in file
//! order. A line that does not parse, names a foreign source, or addresses a
//! path outside the snapshot is logged and skipped; the remaining lines are
//! still applied.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use ensemble_eval_core::event::Event;
use ensemble_eval_core::snapshot::{PartialSnapshot, Snapshot};

use crate::{Error, EvaluatorConfig, Result};

/// Result of a replay run.
#[derive(Debug)]
pub struct ReplayOutcome {
    pub snapshot: Snapshot,
    pub applied: usize,
    pub skipped: usize,
}

/// Apply every event line from `events` to `snapshot` in order.
pub fn replay_events<R: BufRead>(
    mut snapshot: Snapshot,
    events: R,
    config: &EvaluatorConfig,
) -> Result<ReplayOutcome> {
    let mut applied = 0;
    let mut skipped = 0;

    for (index, line) in events.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|source| Error::Io {
            path: "<events>".into(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        match apply_line(&mut snapshot, &line, config) {
            Ok(()) => applied += 1,
            Err(reason) => {
                warn!(line = line_no, %reason, "skipping event");
                skipped += 1;
            }
        }
    }

    debug!(applied, skipped, "replay finished");
    Ok(ReplayOutcome {
        snapshot,
        applied,
        skipped,
    })
}

fn apply_line(snapshot: &mut Snapshot, line: &str, config: &EvaluatorConfig) -> Result<()> {
    let event: Event = serde_json::from_str(line)?;
    if !config.accepts_source(&event.source) {
        return Err(Error::ForeignSource(event.source));
    }
    let mut partial = PartialSnapshot::new(snapshot);
    partial.record_event(&event)?;
    snapshot.merge_event(partial)?;
    Ok(())
}

/// Load a snapshot from a JSON file (the full-tree form).
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    Ok(Snapshot::from_dict(value)?)
}

/// Write the full-tree form of `snapshot` as pretty JSON.
pub fn save_snapshot(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(&snapshot.export())?;
    fs::write(path, text).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Replay the event file at `events_path` onto the snapshot at `snapshot_path`.
pub fn replay_files(
    snapshot_path: &Path,
    events_path: &Path,
    config: &EvaluatorConfig,
) -> Result<ReplayOutcome> {
    let snapshot = load_snapshot(snapshot_path)?;
    let file = fs::File::open(events_path).map_err(|source| Error::Io {
        path: events_path.to_path_buf(),
        source,
    })?;
    replay_events(snapshot, BufReader::new(file), config)
}
