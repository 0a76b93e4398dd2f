//! Core types for the queue adapter.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// System attribute carrying the transport's approximate delivery count.
pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";

/// Typed value of a message attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "data_type", content = "value")]
pub enum MessageAttributeValue {
    String(String),
    /// Numbers travel as their decimal string form.
    Number(String),
    Binary(Vec<u8>),
}

impl MessageAttributeValue {
    #[inline]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    #[inline]
    pub fn number(value: impl ToString) -> Self {
        Self::Number(value.to_string())
    }

    /// Data type label understood by the transport.
    #[inline]
    pub const fn data_type(&self) -> &'static str {
        match self {
            Self::String(_) => "String",
            Self::Number(_) => "Number",
            Self::Binary(_) => "Binary",
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Number(s) => Some(s),
            Self::Binary(_) => None,
        }
    }
}

/// Transport options attached to a message.
///
/// The recognized keys are typed; anything else a transport understands goes
/// through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub message_attributes: BTreeMap<String, MessageAttributeValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_deduplication_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_group_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SendOptions {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_delay_seconds(mut self, delay: i64) -> Self {
        self.delay_seconds = Some(delay);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: MessageAttributeValue) -> Self {
        self.message_attributes.insert(name.into(), value);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_message_group_id(mut self, group: impl Into<String>) -> Self {
        self.message_group_id = Some(group.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Overlay `other` onto `self`: set fields in `other` win, attribute and
    /// extra maps are merged key by key.
    pub fn merge(&mut self, other: SendOptions) {
        if other.delay_seconds.is_some() {
            self.delay_seconds = other.delay_seconds;
        }
        if other.message_deduplication_id.is_some() {
            self.message_deduplication_id = other.message_deduplication_id;
        }
        if other.message_group_id.is_some() {
            self.message_group_id = other.message_group_id;
        }
        self.message_attributes.extend(other.message_attributes);
        self.extra.extend(other.extra);
    }
}

/// Transport-ready representation of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub body: String,
    #[serde(flatten)]
    pub options: SendOptions,
}

/// Destination resolved from a queue name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueHandle {
    pub name: String,
    pub url: String,
    pub fifo: bool,
}

impl QueueHandle {
    /// Whether the queue rejects duplicate deduplication ids within its window.
    #[inline]
    pub const fn requires_deduplication(&self) -> bool {
        self.fifo
    }
}

/// One entry of a batch send. `id` is unique within the send.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub id: String,
    pub message: WireMessage,
}

/// Acknowledgement of a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAck {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSuccess {
    pub id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub id: String,
    pub code: String,
    pub message: String,
    pub sender_fault: bool,
}

/// Per-entry result of a batch send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSendOutput {
    pub successful: Vec<BatchSuccess>,
    pub failed: Vec<BatchFailure>,
}

/// A received message plus transport-assigned delivery metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    /// System attributes such as [`APPROXIMATE_RECEIVE_COUNT`].
    pub attributes: HashMap<String, String>,
    pub message_attributes: BTreeMap<String, MessageAttributeValue>,
}

impl DeliveryReceipt {
    /// Approximate number of deliveries so far, if the transport reported one.
    pub fn approximate_receive_count(&self) -> Option<u32> {
        self.attributes
            .get(APPROXIMATE_RECEIVE_COUNT)
            .and_then(|raw| raw.trim().parse().ok())
    }
}

/// Result of enqueueing a single job.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueReceipt {
    pub message_id: String,
    /// Exactly what was sent, resolved options included.
    pub message: WireMessage,
}

/// Outcome of one job within `enqueue_all`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Position of the job in the input collection.
    pub index: usize,
    pub queue_name: String,
    pub message: WireMessage,
    pub result: Result<String, BatchFailure>,
}

impl JobOutcome {
    #[inline]
    pub fn successfully_enqueued(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary returned by `enqueue_all`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnqueueAllReport {
    /// Number of jobs the transport accepted.
    pub enqueued: usize,
    /// One outcome per input job, in input order.
    pub outcomes: Vec<JobOutcome>,
}

impl EnqueueAllReport {
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.successfully_enqueued())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overlays_set_fields_only() {
        let mut base = SendOptions::new()
            .with_delay_seconds(30)
            .with_message_group_id("a")
            .with_attribute("tenant", MessageAttributeValue::string("acme"))
            .with_extra("message_system_attributes", json!({"x": 1}));

        base.merge(
            SendOptions::new()
                .with_delay_seconds(5)
                .with_attribute("trace", MessageAttributeValue::string("t-1")),
        );

        assert_eq!(base.delay_seconds, Some(5));
        assert_eq!(base.message_group_id.as_deref(), Some("a"));
        assert_eq!(base.message_attributes.len(), 2);
        assert_eq!(base.extra.get("message_system_attributes"), Some(&json!({"x": 1})));
    }

    #[test]
    fn send_options_serialize_flat() {
        let opts = SendOptions::new()
            .with_delay_seconds(10)
            .with_extra("custom", json!("v"));
        let value = serde_json::to_value(&opts).unwrap();
        assert_eq!(value, json!({"delay_seconds": 10, "custom": "v"}));
    }

    #[test]
    fn receive_count_parsing() {
        let mut receipt = DeliveryReceipt::default();
        assert_eq!(receipt.approximate_receive_count(), None);

        receipt
            .attributes
            .insert(APPROXIMATE_RECEIVE_COUNT.into(), "3".into());
        assert_eq!(receipt.approximate_receive_count(), Some(3));

        receipt
            .attributes
            .insert(APPROXIMATE_RECEIVE_COUNT.into(), "n/a".into());
        assert_eq!(receipt.approximate_receive_count(), None);
    }

    #[test]
    fn attribute_data_types() {
        assert_eq!(MessageAttributeValue::number(42).data_type(), "Number");
        assert_eq!(MessageAttributeValue::number(42).as_str(), Some("42"));
        assert_eq!(MessageAttributeValue::Binary(vec![1]).as_str(), None);
    }
}
