//! Transport traits and types
//!
//! Workers, monitors and controllers exchange [`MessageEnvelope`]s over an
//! [`EventTransport`]. Concrete network transports live outside this crate.

use crate::protocol::MessageEnvelope;
use crate::Result;

/// Reliability classification for transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReliabilityClass {
    /// No delivery guarantees
    BestEffort,
    /// At least once delivery with retries
    AtLeastOnce,
    /// Reliable ordered delivery
    Reliable,
}

/// Transport capabilities
#[derive(Debug, Clone)]
pub struct TransportCapabilities {
    pub reliability: ReliabilityClass,
    /// Maximum encoded envelope size in bytes
    pub max_message_size: usize,
}

#[async_trait::async_trait]
pub trait EventTransport: Send + Sync {
    /// Send an envelope to the other end
    async fn send(&self, envelope: &MessageEnvelope) -> Result<()>;

    /// Receive the next envelope, waiting until one is available
    async fn recv(&self) -> Result<MessageEnvelope>;

    fn capabilities(&self) -> TransportCapabilities;
}
