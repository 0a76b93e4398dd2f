//! Consumer side: turns a delivery into a job execution.

use serde_json::Value;
use tracing::debug;

use crate::error::JobQueueError;
use crate::executor::Executors;
use crate::message::HANDLER_ATTRIBUTE;
use crate::types::DeliveryReceipt;

/// Payload key carrying the number of earlier delivery attempts.
pub const PRIOR_ATTEMPTS_KEY: &str = "executions";

/// Number of deliveries before this one. A missing or zero count is treated
/// as a first delivery.
#[inline]
pub fn prior_attempts(receive_count: Option<u32>) -> u32 {
    receive_count.unwrap_or(1).saturating_sub(1)
}

/// Handler bound to every queue the adapter enqueues to.
///
/// Stateless per message: it translates the receive count and forwards the
/// job. Retrying is left to the executor and the transport.
#[derive(Debug, Clone)]
pub struct JobWrapper {
    executors: Executors,
}

impl JobWrapper {
    /// Identifier stamped on every outgoing message under [`HANDLER_ATTRIBUTE`].
    pub const HANDLER_TYPE: &'static str = "jobsqs::JobWrapper";

    pub fn new(executors: Executors) -> Self {
        Self { executors }
    }

    /// Whether the delivery was produced by this adapter.
    pub fn accepts(receipt: &DeliveryReceipt) -> bool {
        receipt
            .message_attributes
            .get(HANDLER_ATTRIBUTE)
            .and_then(|v| v.as_str())
            == Some(Self::HANDLER_TYPE)
    }

    /// Parse the delivery and hand it to the executors with the prior attempt
    /// count under [`PRIOR_ATTEMPTS_KEY`].
    pub async fn perform(&self, receipt: &DeliveryReceipt) -> Result<(), JobQueueError> {
        let payload = Self::payload_for(receipt)?;
        self.executors.execute(payload).await
    }

    /// The payload [`perform`](Self::perform) forwards.
    pub fn payload_for(receipt: &DeliveryReceipt) -> Result<Value, JobQueueError> {
        let mut payload: Value = serde_json::from_str(&receipt.body)
            .map_err(|e| JobQueueError::InvalidPayload(format!("body is not JSON: {e}")))?;

        let previous = prior_attempts(receipt.approximate_receive_count());
        let object = payload.as_object_mut().ok_or_else(|| {
            JobQueueError::InvalidPayload("body is not a JSON object".to_owned())
        })?;
        object.insert(PRIOR_ATTEMPTS_KEY.to_owned(), Value::from(previous));

        debug!(
            message_id = %receipt.message_id,
            prior_attempts = previous,
            "translated delivery into job payload"
        );
        Ok(payload)
    }
}
