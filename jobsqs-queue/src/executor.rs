//! Job executors and the dispatch table the inbound side hands jobs to.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::JobQueueError;

/// Payload key holding the job class name.
pub const JOB_CLASS_KEY: &str = "job_class";

/// Trait for implementing job executors.
///
/// Each job class should have a corresponding executor implementation.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Returns the job class this executor handles.
    fn job_class(&self) -> &str;

    /// Execute the job with the given payload.
    ///
    /// The payload's `executions` key holds the number of earlier delivery
    /// attempts.
    async fn execute(&self, payload: Value) -> Result<(), JobQueueError>;
}

/// Executors keyed by job class.
#[derive(Clone, Default)]
pub struct Executors {
    executors: Arc<RwLock<HashMap<String, Arc<dyn JobExecutor>>>>,
}

impl fmt::Debug for Executors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executors")
            .field(
                "executors",
                &"<RwLock<HashMap<String, Arc<dyn JobExecutor>>>>",
            )
            .finish()
    }
}

impl Executors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for its job class, replacing any previous one.
    pub async fn register<E: JobExecutor + 'static>(&self, executor: E) {
        let job_class = executor.job_class().to_owned();
        let mut executors = self.executors.write().await;
        executors.insert(job_class, Arc::new(executor));
    }

    /// Route `payload` to the executor for its `job_class`.
    pub async fn execute(&self, payload: Value) -> Result<(), JobQueueError> {
        let job_class = payload
            .get(JOB_CLASS_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| JobQueueError::InvalidPayload(format!("missing `{JOB_CLASS_KEY}`")))?
            .to_owned();

        let executor = {
            let executors = self.executors.read().await;
            executors.get(&job_class).cloned()
        };
        let executor = executor.ok_or_else(|| JobQueueError::NoExecutor(job_class.clone()))?;

        info!(job_class = %job_class, "executing job");
        executor.execute(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl JobExecutor for Recorder {
        fn job_class(&self) -> &str {
            "RecordJob"
        }

        async fn execute(&self, payload: Value) -> Result<(), JobQueueError> {
            self.seen.lock().unwrap().push(payload);
            Ok(())
        }
    }

    #[tokio::test]
    async fn routes_by_job_class() {
        let recorder = Recorder::default();
        let seen = Arc::clone(&recorder.seen);
        let executors = Executors::new();
        executors.register(recorder).await;

        executors
            .execute(json!({"job_class": "RecordJob", "arguments": [1]}))
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_class_is_an_error() {
        let executors = Executors::new();
        let err = executors
            .execute(json!({"job_class": "Nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, JobQueueError::NoExecutor(ref c) if c == "Nope"));
    }

    #[tokio::test]
    async fn payload_without_class_is_rejected() {
        let err = Executors::new().execute(json!({})).await.unwrap_err();
        assert!(matches!(err, JobQueueError::InvalidPayload(_)));
    }
}
