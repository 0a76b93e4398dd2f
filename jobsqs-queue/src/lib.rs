//! Bridges background jobs onto an at-least-once message queue transport.
//!
//! The producer side turns a [`Job`] into a [`WireMessage`] (body, handler
//! marker attribute, deduplication id on FIFO queues, caller options) and
//! sends it, singly or batched per queue. The consumer side turns a
//! [`DeliveryReceipt`] back into a job payload annotated with how many times
//! it was delivered before.
//!
//! # Architecture
//!
//! - [`JobQueueAdapter`] - `enqueue`, `enqueue_at` and `enqueue_all`
//! - [`MessageBuilder`] - builds the wire message for one job
//! - [`calculate_delay`] - converts a run time into a bounded delay
//! - [`JobWrapper`] - consumer-side handler forwarding to [`Executors`]
//! - [`QueueTransport`] - the queue service boundary, with [`InMemoryTransport`]
//!
//! # Example
//!
//! ```rust,no_run
//! use jobsqs_queue::{InMemoryTransport, JobQueueAdapter, JobRequest, SendOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), jobsqs_queue::JobQueueError> {
//!     let transport = InMemoryTransport::new();
//!     transport.create_queue("mailers").await;
//!
//!     let adapter = JobQueueAdapter::new(transport);
//!     let job = JobRequest::new("WelcomeMailJob", "mailers", vec![json!(42)]);
//!     let receipt = adapter.enqueue(&job, SendOptions::new()).await?;
//!     println!("enqueued {}", receipt.message_id);
//!     Ok(())
//! }
//! ```

mod adapter;
mod batch;
mod delay;
mod error;
mod executor;
mod inbound;
mod job;
mod message;
mod registry;
pub mod telemetry;
pub mod transport;
mod types;

pub use adapter::JobQueueAdapter;
pub use batch::{group_by_queue, QueueGroup};
pub use delay::{calculate_delay, delay_until, MAX_DELAY_SECONDS};
pub use error::{JobQueueError, TransportError};
pub use executor::{Executors, JobExecutor, JOB_CLASS_KEY};
pub use inbound::{prior_attempts, JobWrapper, PRIOR_ATTEMPTS_KEY};
pub use job::{Job, JobRequest};
pub use message::{deduplication_id, MessageBuilder, HANDLER_ATTRIBUTE};
pub use registry::{QueueCache, WorkerRegistry};
pub use transport::{InMemoryTransport, QueueTransport};
pub use types::{
    BatchEntry, BatchFailure, BatchSendOutput, BatchSuccess, DeliveryReceipt, EnqueueAllReport,
    EnqueueReceipt, JobOutcome, MessageAttributeValue, QueueHandle, SendAck, SendOptions,
    WireMessage, APPROXIMATE_RECEIVE_COUNT,
};

// Re-export async_trait for convenience when implementing JobExecutor or QueueTransport
pub use async_trait::async_trait;
