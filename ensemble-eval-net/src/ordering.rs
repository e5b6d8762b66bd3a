//! Per-source sequence guard for incoming envelopes
//!
//! Merge order is arrival order. Senders that stamp envelopes with a
//! monotonic sequence can opt into this guard, which drops duplicates and
//! messages that fall too far behind the newest sequence seen from the same
//! sender.
//!
//! ## Design
//!
//! - **Per-source state**: each sender address is tracked independently
//! - **LRU cache**: bounded memory (default 1000 sources)
//! - **Sequence window**: small out-of-order tolerance (default 16 messages)

use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use lru::LruCache;
use thiserror::Error;

pub const DEFAULT_SEQUENCE_WINDOW: u64 = 16;
pub const DEFAULT_MAX_TRACKED_SOURCES: usize = 1000;

/// Sequence guard configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequenceConfigError {
    #[error("capacity must be non-zero")]
    ZeroCapacity,
}

/// Rejected sequence numbers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Sequence number already seen
    #[error("duplicate message: source={source_addr}, seq={seq}")]
    Duplicate { source_addr: String, seq: u64 },

    /// Sequence number too far behind the newest one seen
    #[error("sequence too old: source={source_addr}, seq={seq}, last_seen={last_seen}")]
    TooOld {
        source_addr: String,
        seq: u64,
        last_seen: u64,
    },
}

/// Tracks the recent sequence numbers of every sender.
pub struct SequenceGuard {
    sources: LruCache<String, SourceSequenceState>,
    window: u64,
}

impl SequenceGuard {
    /// Default configuration: 1000 sources, window of 16.
    pub fn new() -> Self {
        let capacity =
            NonZeroUsize::new(DEFAULT_MAX_TRACKED_SOURCES).unwrap_or(NonZeroUsize::MIN);
        Self {
            sources: LruCache::new(capacity),
            window: DEFAULT_SEQUENCE_WINDOW,
        }
    }

    /// Custom source capacity and window.
    pub fn try_with_config(capacity: usize, window: u64) -> Result<Self, SequenceConfigError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(SequenceConfigError::ZeroCapacity)?;
        Ok(Self {
            sources: LruCache::new(capacity),
            window,
        })
    }

    /// Check a sequence number and record it when accepted.
    pub fn check(&mut self, source: &str, seq: u64) -> Result<(), SequenceError> {
        self.verify(source, seq)?;
        self.record(source, seq);
        Ok(())
    }

    /// Check a sequence number without recording it.
    ///
    /// Pair with [`record`](Self::record) once the message has been applied,
    /// so a message rejected further down can be resent with the same number.
    pub fn verify(&self, source: &str, seq: u64) -> Result<(), SequenceError> {
        match self.sources.peek(source) {
            Some(state) => state.validate(seq, source, self.window),
            None => Ok(()),
        }
    }

    /// Record a sequence number as seen.
    pub fn record(&mut self, source: &str, seq: u64) {
        match self.sources.get_mut(source) {
            Some(state) => state.update(seq, self.window),
            None => {
                self.sources
                    .put(source.to_string(), SourceSequenceState::new(seq));
            }
        }
    }

    /// Number of sources currently tracked
    pub fn tracked_sources(&self) -> usize {
        self.sources.len()
    }
}

impl Default for SequenceGuard {
    fn default() -> Self {
        Self::new()
    }
}

struct SourceSequenceState {
    last_sequence: u64,
    recent: BTreeSet<u64>,
}

impl SourceSequenceState {
    fn new(initial: u64) -> Self {
        Self {
            last_sequence: initial,
            recent: BTreeSet::from([initial]),
        }
    }

    fn validate(&self, seq: u64, source: &str, window: u64) -> Result<(), SequenceError> {
        if self.recent.contains(&seq) {
            return Err(SequenceError::Duplicate {
                source_addr: source.to_string(),
                seq,
            });
        }
        if seq.saturating_add(window) < self.last_sequence {
            return Err(SequenceError::TooOld {
                source_addr: source.to_string(),
                seq,
                last_seen: self.last_sequence,
            });
        }
        Ok(())
    }

    fn update(&mut self, seq: u64, window: u64) {
        self.recent.insert(seq);
        self.last_sequence = self.last_sequence.max(seq);

        // Window is anchored to the highest sequence seen.
        let threshold = self.last_sequence.saturating_sub(window);
        self.recent.retain(|&s| s >= threshold);
    }
}
