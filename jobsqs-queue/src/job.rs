//! The job boundary and a concrete job request.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::types::SendOptions;

/// A unit of deferred work as seen by the adapter.
pub trait Job: Send + Sync {
    /// Name of the queue the job is routed to.
    fn queue_name(&self) -> &str;

    /// Serialized payload that becomes the message body.
    fn payload(&self) -> Result<Value, serde_json::Error>;

    /// Absolute time the job should run at, if scheduled.
    fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Transport options the caller attached to this job.
    fn send_options(&self) -> SendOptions {
        SendOptions::default()
    }
}

/// A job described by class name and arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub job_class: String,
    pub job_id: Uuid,
    pub queue_name: String,
    pub priority: Option<i32>,
    pub arguments: Vec<Value>,
    pub executions: u32,
    pub enqueued_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub send_options: SendOptions,
}

impl JobRequest {
    #[inline]
    pub fn new(
        job_class: impl Into<String>,
        queue_name: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self {
            job_class: job_class.into(),
            job_id: Uuid::new_v4(),
            queue_name: queue_name.into(),
            priority: None,
            arguments,
            executions: 0,
            enqueued_at: Utc::now(),
            scheduled_at: None,
            send_options: SendOptions::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    #[inline]
    #[must_use]
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_send_options(mut self, options: SendOptions) -> Self {
        self.send_options = options;
        self
    }
}

impl Job for JobRequest {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn payload(&self) -> Result<Value, serde_json::Error> {
        Ok(json!({
            "job_class": self.job_class,
            "job_id": self.job_id,
            "queue_name": self.queue_name,
            "priority": self.priority,
            "arguments": self.arguments,
            "executions": self.executions,
            "enqueued_at": self.enqueued_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        }))
    }

    fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at
    }

    fn send_options(&self) -> SendOptions {
        self.send_options.clone()
    }
}
