//! Boundary to the queue transport.

mod memory;

pub use memory::{InMemoryTransport, SendCall, MAX_MESSAGE_BYTES};

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{BatchEntry, BatchSendOutput, QueueHandle, SendAck, WireMessage};

/// Operations the adapter needs from a queue service client.
///
/// Calls may block on remote I/O; timeouts and cancellation belong to the
/// implementation or the caller's context.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Look up a queue by name.
    async fn resolve(&self, queue_name: &str) -> Result<QueueHandle, TransportError>;

    /// Send one message.
    async fn send_message(
        &self,
        queue: &QueueHandle,
        message: WireMessage,
    ) -> Result<SendAck, TransportError>;

    /// Send several messages in one call. Individual entries may fail
    /// without failing the call.
    async fn send_message_batch(
        &self,
        queue: &QueueHandle,
        entries: Vec<BatchEntry>,
    ) -> Result<BatchSendOutput, TransportError>;
}
