//! In-memory transport for tests and local wiring
//!
//! Envelopes are encoded to bytes on send and decoded on receive, so the
//! framing path is exercised exactly as with a real transport.

use tokio::sync::{mpsc, Mutex};

use crate::protocol::MessageEnvelope;
use crate::traits::{EventTransport, ReliabilityClass, TransportCapabilities};
use crate::{Error, Result};

const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 20;

/// One end of an in-memory duplex link.
#[derive(Debug)]
pub struct MockTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    max_message_size: usize,
}

impl MockTransport {
    /// Create two connected ends
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: a_tx,
                rx: Mutex::new(a_rx),
                max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            },
            Self {
                tx: b_tx,
                rx: Mutex::new(b_rx),
                max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            },
        )
    }

    /// Set the largest envelope this end will send
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

#[async_trait::async_trait]
impl EventTransport for MockTransport {
    async fn send(&self, envelope: &MessageEnvelope) -> Result<()> {
        let bytes = envelope.serialize()?;
        if bytes.len() > self.max_message_size {
            return Err(Error::MessageTooLarge {
                size: bytes.len(),
                limit: self.max_message_size,
            });
        }
        tracing::trace!(
            sender = %envelope.sender,
            sequence = envelope.sequence,
            bytes = bytes.len(),
            "mock transport send"
        );
        self.tx.send(bytes).map_err(|_| Error::Closed)
    }

    async fn recv(&self) -> Result<MessageEnvelope> {
        let bytes = self.rx.lock().await.recv().await.ok_or(Error::Closed)?;
        MessageEnvelope::deserialize(&bytes)
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            reliability: ReliabilityClass::Reliable,
            max_message_size: self.max_message_size,
        }
    }
}
