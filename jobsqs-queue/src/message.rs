//! Construction of wire messages from jobs.

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::JobQueueError;
use crate::inbound::JobWrapper;
use crate::job::Job;
use crate::types::{MessageAttributeValue, QueueHandle, SendOptions, WireMessage};

/// Message attribute naming the handler type that consumes the message.
pub const HANDLER_ATTRIBUTE: &str = "jobsqs_class";

/// Payload fields that differ between otherwise identical enqueues.
const VOLATILE_PAYLOAD_FIELDS: [&str; 2] = ["job_id", "enqueued_at"];

/// Builds wire messages for a queue.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    default_message_group_id: String,
}

impl MessageBuilder {
    pub fn new(default_message_group_id: impl Into<String>) -> Self {
        Self {
            default_message_group_id: default_message_group_id.into(),
        }
    }

    /// Build the message for `job` using the job's own send options.
    pub fn build<J: Job + ?Sized>(
        &self,
        queue: &QueueHandle,
        job: &J,
    ) -> Result<WireMessage, JobQueueError> {
        self.build_with(queue, job, job.send_options())
    }

    /// Build the message for `job` with an already merged option set.
    ///
    /// The returned message's `options` are the fully resolved set: caller
    /// attributes plus the handler marker, the computed deduplication id on
    /// FIFO queues, and every other option passed through unchanged.
    pub fn build_with<J: Job + ?Sized>(
        &self,
        queue: &QueueHandle,
        job: &J,
        mut options: SendOptions,
    ) -> Result<WireMessage, JobQueueError> {
        let payload = job.payload()?;
        let body = serde_json::to_string(&payload)?;

        // The marker goes in last so a caller attribute with the same name
        // can never hide the message from its consumer.
        options.message_attributes.insert(
            HANDLER_ATTRIBUTE.to_owned(),
            MessageAttributeValue::string(JobWrapper::HANDLER_TYPE),
        );

        if queue.requires_deduplication() {
            options.message_deduplication_id = Some(deduplication_id(&payload)?);
            if options.message_group_id.is_none() {
                options.message_group_id = Some(self.default_message_group_id.clone());
            }
        } else {
            options.message_deduplication_id = None;
        }

        debug!(
            queue = %queue.name,
            fifo = queue.fifo,
            body_len = body.len(),
            delay_seconds = ?options.delay_seconds,
            "built wire message"
        );

        Ok(WireMessage { body, options })
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new(jobsqs_config::DEFAULT_MESSAGE_GROUP_ID)
    }
}

/// Hex SHA-256 of the canonical payload with volatile fields removed.
///
/// Object keys are sorted at every level before hashing, so equal payloads
/// hash equal however they were assembled and whichever map ordering
/// `serde_json` was built with.
pub fn deduplication_id(payload: &Value) -> Result<String, JobQueueError> {
    let canonical = match payload {
        Value::Object(map) => {
            let mut stripped = map.clone();
            for field in VOLATILE_PAYLOAD_FIELDS {
                stripped.remove(field);
            }
            serde_json::to_string(&sorted_keys(Value::Object(stripped)))?
        }
        other => serde_json::to_string(&sorted_keys(other.clone()))?,
    };
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

fn sorted_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sorted_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted_keys).collect()),
        other => other,
    }
}
