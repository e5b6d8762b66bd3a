//! # Ensemble Evaluator Network
//!
//! Wire plumbing between workers, the evaluator and its clients.
//!
//! This crate provides:
//! - Message framing for events, snapshot updates, full snapshots and commands
//! - An opt-in per-source sequence guard
//! - The `EventTransport` trait and an in-memory transport

#![forbid(unsafe_code)]

pub mod ordering;
pub mod protocol;
pub mod traits;

mod mock;
pub use mock::MockTransport;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::ordering::{SequenceError, SequenceGuard};
    pub use crate::protocol::{Message, MessageEnvelope, MessageType};
    pub use crate::traits::*;
}

/// Result type for network operations
pub type Result<T> = core::result::Result<T, Error>;

/// Network error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("envelope framing failed: {0}")]
    Framing(#[from] postcard::Error),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Command(#[from] ensemble_eval_core::command::CommandError),

    #[error("unsupported protocol version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error(transparent)]
    Sequence(#[from] ordering::SequenceError),

    #[error("message of {size} bytes exceeds transport limit of {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("transport closed")]
    Closed,
}
