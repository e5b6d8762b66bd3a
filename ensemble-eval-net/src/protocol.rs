//! Message protocol and framing
//!
//! This module defines the wire format exchanged between workers, the
//! evaluator, monitoring clients and controllers. The envelope is framed with
//! postcard; the payload inside it is the JSON structured form of the carried
//! message (events, deltas and snapshots use self-describing encodings).

use serde::{Deserialize, Serialize};

use ensemble_eval_core::command::Command;
use ensemble_eval_core::event::Event;
use ensemble_eval_core::snapshot::{SnapshotDelta, SnapshotExport};

use crate::{Error, Result};

/// Message envelope for all evaluator communications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Protocol version (major, minor)
    pub version: (u8, u8),
    /// Message type discriminator
    pub message_type: MessageType,
    /// Sender identity; for worker events, the event-source address
    pub sender: String,
    /// Per-sender sequence number (optional ordering guard)
    pub sequence: u64,
    /// Unix timestamp (milliseconds)
    pub timestamp: u64,
    /// JSON payload bytes
    pub payload: Vec<u8>,
}

/// Message type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Worker status event
    Event = 0x01,
    /// Partial snapshot (delta) for subscribers
    SnapshotUpdate = 0x02,
    /// Full snapshot for a newly attached consumer
    FullSnapshot = 0x03,
    /// Controller command (pause / terminate)
    Command = 0x04,
}

/// A decoded envelope payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Event(Event),
    SnapshotUpdate(SnapshotDelta),
    FullSnapshot(SnapshotExport),
    Command(Command),
}

impl MessageEnvelope {
    /// Current protocol version
    pub const CURRENT_VERSION: (u8, u8) = (0, 1);

    /// Create a new message envelope
    pub fn new(sender: impl Into<String>, message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            message_type,
            sender: sender.into(),
            sequence: 0,
            timestamp: 0,
            payload,
        }
    }

    /// Wrap a worker event; the sender is the event's source address
    pub fn event(event: &Event) -> Result<Self> {
        let payload = serde_json::to_vec(event)?;
        Ok(Self::new(event.source.clone(), MessageType::Event, payload))
    }

    /// Wrap a delta for downstream subscribers.
    pub fn snapshot_update(sender: impl Into<String>, delta: &SnapshotDelta) -> Result<Self> {
        let payload = serde_json::to_vec(delta)?;
        Ok(Self::new(sender, MessageType::SnapshotUpdate, payload))
    }

    /// Wrap a full tree for a newly attached consumer.
    pub fn full_snapshot(sender: impl Into<String>, snapshot: &SnapshotExport) -> Result<Self> {
        let payload = serde_json::to_vec(snapshot)?;
        Ok(Self::new(sender, MessageType::FullSnapshot, payload))
    }

    /// Wrap a control command. Commands are not sequenced.
    pub fn command(sender: impl Into<String>, command: Command) -> Self {
        Self::new(
            sender,
            MessageType::Command,
            command.to_json().into_bytes(),
        )
    }

    /// Set the sequence number
    pub fn with_sequence(mut self, seq: u64) -> Self {
        self.sequence = seq;
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, ts: u64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Serialize the envelope to bytes
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Deserialize from bytes, rejecting incompatible major versions
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = postcard::from_bytes(bytes)?;
        if envelope.version.0 != Self::CURRENT_VERSION.0 {
            return Err(Error::UnsupportedVersion {
                major: envelope.version.0,
                minor: envelope.version.1,
            });
        }
        Ok(envelope)
    }

    /// Decode the payload according to the message type
    pub fn decode(&self) -> Result<Message> {
        let message = match self.message_type {
            MessageType::Event => Message::Event(serde_json::from_slice(&self.payload)?),
            MessageType::SnapshotUpdate => {
                Message::SnapshotUpdate(serde_json::from_slice(&self.payload)?)
            }
            MessageType::FullSnapshot => {
                Message::FullSnapshot(serde_json::from_slice(&self.payload)?)
            }
            MessageType::Command => {
                let value: serde_json::Value = serde_json::from_slice(&self.payload)?;
                Message::Command(Command::from_dict(&value)?)
            }
        };
        Ok(message)
    }
}
