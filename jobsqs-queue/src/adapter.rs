//! Enqueue facade.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jobsqs_config::{validate_config, AdapterConfig};
use tracing::info;

use crate::delay::delay_until;
use crate::error::JobQueueError;
use crate::inbound::JobWrapper;
use crate::job::Job;
use crate::message::MessageBuilder;
use crate::registry::{QueueCache, WorkerRegistry};
use crate::transport::QueueTransport;
use crate::types::{EnqueueReceipt, QueueHandle, SendOptions};

/// Entry point for submitting jobs to the queue transport.
///
/// Cheap to clone; clones share the transport and both registries.
#[derive(Clone)]
pub struct JobQueueAdapter {
    pub(crate) transport: Arc<dyn QueueTransport>,
    pub(crate) queues: Arc<QueueCache>,
    pub(crate) workers: Arc<WorkerRegistry>,
    pub(crate) builder: MessageBuilder,
    pub(crate) max_batch_entries: Option<usize>,
}

impl fmt::Debug for JobQueueAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueueAdapter")
            .field("transport", &"<dyn QueueTransport>")
            .field("queues", &self.queues.len())
            .field("workers", &self.workers.len())
            .field("builder", &self.builder)
            .field("max_batch_entries", &self.max_batch_entries)
            .finish()
    }
}

impl JobQueueAdapter {
    /// Adapter with default settings and the process-wide worker registry.
    pub fn new<T: QueueTransport + 'static>(transport: T) -> Self {
        Self::build(transport, &AdapterConfig::default())
    }

    /// Adapter from validated settings and the process-wide worker registry.
    pub fn from_config<T: QueueTransport + 'static>(
        transport: T,
        config: &AdapterConfig,
    ) -> Result<Self, JobQueueError> {
        validate_config(config)?;
        Ok(Self::build(transport, config))
    }

    fn build<T: QueueTransport + 'static>(transport: T, config: &AdapterConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            queues: Arc::new(QueueCache::new()),
            workers: WorkerRegistry::global(),
            builder: MessageBuilder::new(config.queues.default_message_group_id.clone()),
            max_batch_entries: config.queues.max_batch_entries,
        }
    }

    /// Use `workers` instead of the process-wide registry.
    #[must_use]
    pub fn with_worker_registry(mut self, workers: Arc<WorkerRegistry>) -> Self {
        self.workers = workers;
        self
    }

    #[inline]
    pub fn workers(&self) -> &Arc<WorkerRegistry> {
        &self.workers
    }

    /// Send one job, overlaying `options` onto the job's own send options.
    ///
    /// A job with a `scheduled_at` time is delayed until then unless `options`
    /// sets a delay of its own. The receipt carries the exact message sent, so
    /// callers can inspect the resolved options (deduplication id included)
    /// afterwards.
    pub async fn enqueue<J: Job + ?Sized>(
        &self,
        job: &J,
        options: SendOptions,
    ) -> Result<EnqueueReceipt, JobQueueError> {
        let mut merged = job.send_options();
        if options.delay_seconds.is_none() {
            if let Some(at) = job.scheduled_at() {
                merged.delay_seconds = Some(delay_until(at, Utc::now())?);
            }
        }
        merged.merge(options);

        self.register_worker(job.queue_name());
        let queue = self.queue(job.queue_name()).await?;
        let message = self.builder.build_with(&queue, job, merged)?;

        let ack = self.transport.send_message(&queue, message.clone()).await?;
        info!(
            queue = %queue.name,
            message_id = %ack.message_id,
            delay_seconds = ?message.options.delay_seconds,
            "enqueued job"
        );

        Ok(EnqueueReceipt {
            message_id: ack.message_id,
            message,
        })
    }

    /// Send one job to become visible at `timestamp`.
    pub async fn enqueue_at<J: Job + ?Sized>(
        &self,
        job: &J,
        timestamp: DateTime<Utc>,
    ) -> Result<EnqueueReceipt, JobQueueError> {
        let delay = delay_until(timestamp, Utc::now())?;
        self.enqueue(job, SendOptions::new().with_delay_seconds(delay))
            .await
    }

    #[inline]
    pub(crate) fn register_worker(&self, queue_name: &str) {
        self.workers.register(queue_name, JobWrapper::HANDLER_TYPE);
    }

    #[inline]
    pub(crate) async fn queue(&self, queue_name: &str) -> Result<QueueHandle, JobQueueError> {
        Ok(self
            .queues
            .resolve(self.transport.as_ref(), queue_name)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobRequest;
    use crate::message::HANDLER_ATTRIBUTE;
    use crate::transport::{InMemoryTransport, SendCall};
    use crate::types::MessageAttributeValue;
    use chrono::Duration;
    use serde_json::json;

    async fn setup(queues: &[&str]) -> (InMemoryTransport, JobQueueAdapter) {
        let transport = InMemoryTransport::new();
        for q in queues {
            transport.create_queue(*q).await;
        }
        let adapter = JobQueueAdapter::new(transport.clone())
            .with_worker_registry(Arc::new(WorkerRegistry::new()));
        (transport, adapter)
    }

    #[tokio::test]
    async fn enqueue_sends_one_message_and_registers_worker() {
        let (transport, adapter) = setup(&["default"]).await;
        let job = JobRequest::new("MailJob", "default", vec![json!("hi")]);

        let receipt = adapter.enqueue(&job, SendOptions::new()).await.unwrap();

        let calls = transport.calls().await;
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            SendCall::Single { queue, message } => {
                assert_eq!(queue, "default");
                assert_eq!(message, &receipt.message);
            }
            other => panic!("unexpected call {other:?}"),
        }
        assert_eq!(
            adapter.workers().handler_for("default"),
            Some(JobWrapper::HANDLER_TYPE)
        );
    }

    #[tokio::test]
    async fn receipt_matches_the_wire_exactly() {
        let (transport, adapter) = setup(&["orders.fifo"]).await;
        let job = JobRequest::new("OrderJob", "orders.fifo", vec![json!({"id": 7})])
            .with_send_options(
                SendOptions::new()
                    .with_attribute("tenant", MessageAttributeValue::string("acme")),
            );

        let receipt = adapter
            .enqueue(&job, SendOptions::new().with_extra("custom", json!(true)))
            .await
            .unwrap();

        let stored = transport.messages("orders.fifo").await;
        assert_eq!(stored, vec![receipt.message.clone()]);

        let opts = &receipt.message.options;
        assert!(opts.message_attributes.contains_key(HANDLER_ATTRIBUTE));
        assert!(opts.message_attributes.contains_key("tenant"));
        assert!(opts.message_deduplication_id.is_some());
        assert_eq!(opts.extra.get("custom"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn call_options_override_job_options() {
        let (_transport, adapter) = setup(&["default"]).await;
        let job = JobRequest::new("J", "default", vec![])
            .with_send_options(SendOptions::new().with_delay_seconds(100));

        let receipt = adapter
            .enqueue(&job, SendOptions::new().with_delay_seconds(5))
            .await
            .unwrap();
        assert_eq!(receipt.message.options.delay_seconds, Some(5));
    }

    #[tokio::test]
    async fn enqueue_at_sets_delay() {
        let (_transport, adapter) = setup(&["default"]).await;
        let job = JobRequest::new("J", "default", vec![]);

        let receipt = adapter
            .enqueue_at(&job, Utc::now() + Duration::seconds(300))
            .await
            .unwrap();
        let delay = receipt.message.options.delay_seconds.unwrap();
        assert!((299..=300).contains(&delay), "delay was {delay}");
    }

    #[tokio::test]
    async fn enqueue_at_rejects_long_delays_without_sending() {
        let (transport, adapter) = setup(&["default"]).await;
        let job = JobRequest::new("J", "default", vec![]);

        let err = adapter
            .enqueue_at(&job, Utc::now() + Duration::minutes(20))
            .await
            .unwrap_err();
        assert!(matches!(err, JobQueueError::InvalidDelay { max: 900, .. }));
        assert!(transport.calls().await.is_empty());
    }

    #[tokio::test]
    async fn enqueue_honours_the_job_schedule() {
        let (transport, adapter) = setup(&["default"]).await;
        let job = JobRequest::new("J", "default", vec![])
            .scheduled_for(Utc::now() + Duration::seconds(120));

        let receipt = adapter.enqueue(&job, SendOptions::new()).await.unwrap();
        let delay = receipt.message.options.delay_seconds.unwrap();
        assert!((119..=120).contains(&delay), "delay was {delay}");

        let late = JobRequest::new("J", "default", vec![])
            .scheduled_for(Utc::now() + Duration::hours(2));
        let err = adapter.enqueue(&late, SendOptions::new()).await.unwrap_err();
        assert!(matches!(err, JobQueueError::InvalidDelay { .. }));
        assert_eq!(transport.calls().await.len(), 1);

        // an explicit delay replaces the schedule
        let receipt = adapter
            .enqueue(&late, SendOptions::new().with_delay_seconds(5))
            .await
            .unwrap();
        assert_eq!(receipt.message.options.delay_seconds, Some(5));
    }

    #[test]
    fn from_config_rejects_oversized_batches() {
        let mut config = AdapterConfig::default();
        config.queues.max_batch_entries = Some(25);

        let err = JobQueueAdapter::from_config(InMemoryTransport::new(), &config).unwrap_err();
        assert!(matches!(err, JobQueueError::Config(_)));
        assert!(err.to_string().contains("max_batch_entries"));

        config.queues.max_batch_entries = Some(10);
        let adapter = JobQueueAdapter::from_config(InMemoryTransport::new(), &config).unwrap();
        assert_eq!(adapter.max_batch_entries, Some(10));
    }

    #[tokio::test]
    async fn queue_cache_is_shared_by_clones_only() {
        let (first_transport, first) = setup(&["default"]).await;
        let (second_transport, second) = setup(&["default"]).await;
        let job = JobRequest::new("J", "default", vec![]);

        first.enqueue(&job, SendOptions::new()).await.unwrap();
        first.clone().enqueue(&job, SendOptions::new()).await.unwrap();
        second.enqueue(&job, SendOptions::new()).await.unwrap();

        assert_eq!(first_transport.resolve_count().await, 1);
        assert_eq!(second_transport.resolve_count().await, 1);
        assert_eq!(second_transport.messages("default").await.len(), 1);
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let (transport, adapter) = setup(&["default"]).await;
        transport.fail_sends_to("default").await;

        let err = adapter
            .enqueue(&JobRequest::new("J", "default", vec![]), SendOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobQueueError::Transport(_)));
    }

    #[tokio::test]
    async fn unknown_queue_is_a_transport_error() {
        let (_transport, adapter) = setup(&[]).await;
        let err = adapter
            .enqueue(&JobRequest::new("J", "nowhere", vec![]), SendOptions::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn queue_is_resolved_once_across_enqueues() {
        let (transport, adapter) = setup(&["default"]).await;
        for _ in 0..3 {
            adapter
                .enqueue(&JobRequest::new("J", "default", vec![]), SendOptions::new())
                .await
                .unwrap();
        }
        assert_eq!(transport.resolve_count().await, 1);
    }
}
