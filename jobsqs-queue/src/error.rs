//! Error types for the queue adapter.

use std::borrow::Cow;

use jobsqs_config::ConfigError;
use thiserror::Error;

use crate::delay::MAX_DELAY_SECONDS;
use crate::types::JobOutcome;

/// Errors that may occur while enqueueing or consuming jobs.
#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error(
        "requested delay of {requested}s exceeds the maximum allowed delay of {max}s (15 minutes)"
    )]
    InvalidDelay { requested: i64, max: i64 },

    #[error("failed to serialize job payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid adapter configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(
        "batch send to queue `{queue_name}` failed after {enqueued} job(s) were already enqueued: {source}"
    )]
    BatchInterrupted {
        queue_name: String,
        enqueued: usize,
        /// Outcomes of every job sent before the failing batch, in input order.
        completed: Vec<JobOutcome>,
        #[source]
        source: TransportError,
    },

    #[error("invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("no executor registered for job class `{0}`")]
    NoExecutor(String),

    #[error("job execution failed: {0}")]
    ExecutionFailed(String),
}

impl JobQueueError {
    #[inline]
    pub(crate) const fn invalid_delay(requested: i64) -> Self {
        Self::InvalidDelay {
            requested,
            max: MAX_DELAY_SECONDS,
        }
    }
}

/// Opaque failure reported by a queue transport.
#[derive(Debug)]
pub struct TransportError {
    message: Cow<'static, str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl TransportError {
    #[must_use]
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying client error.
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}
