//! In-memory queue transport.
//!
//! Useful for tests and local runs without provisioning real queues. Queues
//! must be created up front; a name ending in `.fifo` creates a FIFO queue
//! that requires a message group and deduplication id and silently drops
//! messages whose deduplication id it has already seen.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::QueueTransport;
use crate::delay::MAX_DELAY_SECONDS;
use crate::error::TransportError;
use crate::types::{
    BatchEntry, BatchFailure, BatchSendOutput, BatchSuccess, DeliveryReceipt, QueueHandle,
    SendAck, WireMessage, APPROXIMATE_RECEIVE_COUNT,
};

/// Largest message body the transport accepts.
pub const MAX_MESSAGE_BYTES: usize = 256 * 1024;

const FIFO_SUFFIX: &str = ".fifo";

/// A send call as the transport observed it.
#[derive(Debug, Clone, PartialEq)]
pub enum SendCall {
    Single {
        queue: String,
        message: WireMessage,
    },
    Batch {
        queue: String,
        entries: Vec<BatchEntry>,
    },
}

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    receipt_handle: Option<String>,
    message: WireMessage,
    receive_count: u32,
}

#[derive(Debug)]
struct QueueState {
    handle: QueueHandle,
    messages: VecDeque<StoredMessage>,
    /// Deduplication id to the message id first stored under it.
    seen_dedup_ids: HashMap<String, String>,
}

impl QueueState {
    fn new(handle: QueueHandle) -> Self {
        Self {
            handle,
            messages: VecDeque::new(),
            seen_dedup_ids: HashMap::new(),
        }
    }

    /// Store a validated message, returning its id.
    fn store(&mut self, message: WireMessage) -> String {
        if let Some(dedup_id) = &message.options.message_deduplication_id {
            if let Some(existing) = self.seen_dedup_ids.get(dedup_id) {
                return existing.clone();
            }
        }

        let message_id = Uuid::new_v4().to_string();
        if self.handle.fifo {
            if let Some(dedup_id) = &message.options.message_deduplication_id {
                self.seen_dedup_ids
                    .insert(dedup_id.clone(), message_id.clone());
            }
        }
        self.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            receipt_handle: None,
            message,
            receive_count: 0,
        });
        message_id
    }
}

#[derive(Debug, Default)]
struct TransportState {
    queues: HashMap<String, QueueState>,
    failing: HashSet<String>,
    calls: Vec<SendCall>,
    resolve_calls: usize,
}

/// Queue transport that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<RwLock<TransportState>>,
}

impl fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("state", &"<RwLock<TransportState>>")
            .finish()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue. Creating an existing queue returns its handle unchanged.
    pub async fn create_queue(&self, name: impl Into<String>) -> QueueHandle {
        let name = name.into();
        let mut state = self.state.write().await;
        state
            .queues
            .entry(name.clone())
            .or_insert_with(|| {
                QueueState::new(QueueHandle {
                    fifo: name.ends_with(FIFO_SUFFIX),
                    url: format!("memory://queues/{name}"),
                    name: name.clone(),
                })
            })
            .handle
            .clone()
    }

    /// Make every subsequent send to `queue_name` fail.
    pub async fn fail_sends_to(&self, queue_name: impl Into<String>) {
        self.state.write().await.failing.insert(queue_name.into());
    }

    /// Every send call made so far, in order.
    pub async fn calls(&self) -> Vec<SendCall> {
        self.state.read().await.calls.clone()
    }

    /// Number of queue lookups served.
    pub async fn resolve_count(&self) -> usize {
        self.state.read().await.resolve_calls
    }

    /// Messages currently stored in a queue, oldest first.
    pub async fn messages(&self, queue_name: &str) -> Vec<WireMessage> {
        let state = self.state.read().await;
        state
            .queues
            .get(queue_name)
            .map(|q| q.messages.iter().map(|m| m.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Deliver the oldest message of a queue.
    ///
    /// The message stays in the queue until deleted, so receiving again
    /// redelivers it with a higher receive count.
    pub async fn receive(&self, queue_name: &str) -> Option<DeliveryReceipt> {
        let mut state = self.state.write().await;
        let stored = state.queues.get_mut(queue_name)?.messages.front_mut()?;

        stored.receive_count += 1;
        let receipt_handle = Uuid::new_v4().to_string();
        stored.receipt_handle = Some(receipt_handle.clone());

        let mut attributes = HashMap::new();
        attributes.insert(
            APPROXIMATE_RECEIVE_COUNT.to_owned(),
            stored.receive_count.to_string(),
        );

        Some(DeliveryReceipt {
            message_id: stored.message_id.clone(),
            receipt_handle,
            body: stored.message.body.clone(),
            attributes,
            message_attributes: stored.message.options.message_attributes.clone(),
        })
    }

    /// Delete a received message. Returns false for an unknown or stale handle.
    pub async fn delete(&self, queue_name: &str, receipt_handle: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(queue) = state.queues.get_mut(queue_name) else {
            return false;
        };
        let before = queue.messages.len();
        queue
            .messages
            .retain(|m| m.receipt_handle.as_deref() != Some(receipt_handle));
        queue.messages.len() != before
    }
}

/// Reject entries the real service would refuse, as `(code, message)`.
fn validate(queue: &QueueHandle, message: &WireMessage) -> Result<(), (&'static str, String)> {
    if message.body.len() > MAX_MESSAGE_BYTES {
        return Err((
            "InvalidParameterValue",
            format!(
                "message body is {} bytes, the limit is {}",
                message.body.len(),
                MAX_MESSAGE_BYTES
            ),
        ));
    }
    if let Some(delay) = message.options.delay_seconds {
        if delay > MAX_DELAY_SECONDS {
            return Err((
                "InvalidParameterValue",
                format!("delay_seconds {delay} exceeds {MAX_DELAY_SECONDS}"),
            ));
        }
    }
    if queue.fifo {
        if message.options.message_group_id.is_none() {
            return Err((
                "MissingParameter",
                "FIFO queue requires message_group_id".to_owned(),
            ));
        }
        if message.options.message_deduplication_id.is_none() {
            return Err((
                "MissingParameter",
                "FIFO queue requires message_deduplication_id".to_owned(),
            ));
        }
    } else if message.options.message_deduplication_id.is_some() {
        return Err((
            "InvalidParameterValue",
            "message_deduplication_id is only valid on FIFO queues".to_owned(),
        ));
    }
    Ok(())
}

#[inline]
fn check_not_failing(state: &TransportState, queue: &QueueHandle) -> Result<(), TransportError> {
    if state.failing.contains(&queue.name) {
        Err(TransportError::new(format!(
            "queue `{}` is unavailable",
            queue.name
        )))
    } else {
        Ok(())
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn resolve(&self, queue_name: &str) -> Result<QueueHandle, TransportError> {
        let mut state = self.state.write().await;
        state.resolve_calls += 1;
        state
            .queues
            .get(queue_name)
            .map(|q| q.handle.clone())
            .ok_or_else(|| TransportError::new(format!("queue `{queue_name}` does not exist")))
    }

    async fn send_message(
        &self,
        queue: &QueueHandle,
        message: WireMessage,
    ) -> Result<SendAck, TransportError> {
        let mut state = self.state.write().await;
        state.calls.push(SendCall::Single {
            queue: queue.name.clone(),
            message: message.clone(),
        });
        check_not_failing(&state, queue)?;

        if let Err((code, reason)) = validate(queue, &message) {
            return Err(TransportError::new(format!("{code}: {reason}")));
        }

        let queue_state = state
            .queues
            .get_mut(&queue.name)
            .ok_or_else(|| TransportError::new(format!("queue `{}` does not exist", queue.name)))?;
        let message_id = queue_state.store(message);
        Ok(SendAck { message_id })
    }

    async fn send_message_batch(
        &self,
        queue: &QueueHandle,
        entries: Vec<BatchEntry>,
    ) -> Result<BatchSendOutput, TransportError> {
        let mut state = self.state.write().await;
        state.calls.push(SendCall::Batch {
            queue: queue.name.clone(),
            entries: entries.clone(),
        });
        check_not_failing(&state, queue)?;

        if entries.is_empty() {
            return Err(TransportError::new("EmptyBatchRequest: no entries"));
        }
        let mut ids = HashSet::with_capacity(entries.len());
        if !entries.iter().all(|e| ids.insert(e.id.as_str())) {
            return Err(TransportError::new(
                "BatchEntryIdsNotDistinct: entry ids must be unique within a batch",
            ));
        }

        let queue_state = state
            .queues
            .get_mut(&queue.name)
            .ok_or_else(|| TransportError::new(format!("queue `{}` does not exist", queue.name)))?;

        let mut output = BatchSendOutput::default();
        for entry in entries {
            match validate(&queue_state.handle, &entry.message) {
                Ok(()) => {
                    let message_id = queue_state.store(entry.message);
                    output.successful.push(BatchSuccess {
                        id: entry.id,
                        message_id,
                    });
                }
                Err((code, message)) => output.failed.push(BatchFailure {
                    id: entry.id,
                    code: code.to_owned(),
                    message,
                    sender_fault: true,
                }),
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SendOptions;

    fn message(body: &str) -> WireMessage {
        WireMessage {
            body: body.to_owned(),
            options: SendOptions::default(),
        }
    }

    fn fifo_message(body: &str, dedup: &str) -> WireMessage {
        let mut m = message(body);
        m.options.message_group_id = Some("g".into());
        m.options.message_deduplication_id = Some(dedup.into());
        m
    }

    #[tokio::test]
    async fn resolve_unknown_queue_fails() {
        let transport = InMemoryTransport::new();
        let err = transport.resolve("missing").await.unwrap_err();
        assert!(err.message().contains("missing"));
        assert_eq!(transport.resolve_count().await, 1);
    }

    #[tokio::test]
    async fn fifo_detection_by_suffix() {
        let transport = InMemoryTransport::new();
        assert!(transport.create_queue("orders.fifo").await.fifo);
        assert!(!transport.create_queue("orders").await.fifo);
    }

    #[tokio::test]
    async fn fifo_drops_duplicates() {
        let transport = InMemoryTransport::new();
        let q = transport.create_queue("orders.fifo").await;

        let first = transport
            .send_message(&q, fifo_message("a", "d1"))
            .await
            .unwrap();
        let second = transport
            .send_message(&q, fifo_message("a-again", "d1"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.messages("orders.fifo").await.len(), 1);
    }

    #[tokio::test]
    async fn fifo_requires_group_id() {
        let transport = InMemoryTransport::new();
        let q = transport.create_queue("orders.fifo").await;
        let err = transport.send_message(&q, message("x")).await.unwrap_err();
        assert!(err.message().starts_with("MissingParameter"));
    }

    #[tokio::test]
    async fn batch_reports_per_entry_failures() {
        let transport = InMemoryTransport::new();
        let q = transport.create_queue("default").await;

        let entries = vec![
            BatchEntry {
                id: "0".into(),
                message: message("ok"),
            },
            BatchEntry {
                id: "1".into(),
                message: message(&"x".repeat(MAX_MESSAGE_BYTES + 1)),
            },
        ];
        let out = transport.send_message_batch(&q, entries).await.unwrap();

        assert_eq!(out.successful.len(), 1);
        assert_eq!(out.successful[0].id, "0");
        assert_eq!(out.failed.len(), 1);
        assert_eq!(out.failed[0].id, "1");
        assert_eq!(out.failed[0].code, "InvalidParameterValue");
    }

    #[tokio::test]
    async fn batch_rejects_duplicate_entry_ids() {
        let transport = InMemoryTransport::new();
        let q = transport.create_queue("default").await;
        let entry = BatchEntry {
            id: "0".into(),
            message: message("a"),
        };
        let err = transport
            .send_message_batch(&q, vec![entry.clone(), entry])
            .await
            .unwrap_err();
        assert!(err.message().starts_with("BatchEntryIdsNotDistinct"));
        assert!(transport.messages("default").await.is_empty());
    }

    #[tokio::test]
    async fn receive_counts_redeliveries_until_deleted() {
        let transport = InMemoryTransport::new();
        let q = transport.create_queue("default").await;
        transport.send_message(&q, message("m")).await.unwrap();

        let first = transport.receive("default").await.unwrap();
        assert_eq!(first.approximate_receive_count(), Some(1));
        let second = transport.receive("default").await.unwrap();
        assert_eq!(second.approximate_receive_count(), Some(2));
        assert_eq!(first.message_id, second.message_id);

        // the first handle went stale on redelivery
        assert!(!transport.delete("default", &first.receipt_handle).await);
        assert!(transport.delete("default", &second.receipt_handle).await);
        assert!(transport.receive("default").await.is_none());
    }

    #[tokio::test]
    async fn failing_queue_rejects_sends() {
        let transport = InMemoryTransport::new();
        let q = transport.create_queue("default").await;
        transport.fail_sends_to("default").await;

        assert!(transport.send_message(&q, message("m")).await.is_err());
        assert_eq!(transport.calls().await.len(), 1);
        assert!(transport.messages("default").await.is_empty());
    }
}
