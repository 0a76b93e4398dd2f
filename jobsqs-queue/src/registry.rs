//! Process-wide bindings keyed by queue name.
//!
//! Both registries are insert-only and idempotent: concurrent first-time
//! writes for the same queue name both succeed and leave one entry behind.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::QueueTransport;
use crate::types::QueueHandle;

static GLOBAL_WORKERS: Lazy<Arc<WorkerRegistry>> = Lazy::new(|| Arc::new(WorkerRegistry::new()));

/// Which handler type consumes each queue.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: DashMap<String, &'static str>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every adapter in the process, created on first use.
    pub fn global() -> Arc<WorkerRegistry> {
        Arc::clone(&*GLOBAL_WORKERS)
    }

    /// Bind `handler` to `queue_name`. Returns true when the binding is new.
    pub fn register(&self, queue_name: &str, handler: &'static str) -> bool {
        if self
            .workers
            .get(queue_name)
            .is_some_and(|existing| *existing == handler)
        {
            return false;
        }
        let previous = self.workers.insert(queue_name.to_owned(), handler);
        if previous.is_none() {
            debug!(queue = queue_name, handler, "registered queue worker");
        }
        previous.is_none()
    }

    /// Handler type bound to a queue, if any.
    pub fn handler_for(&self, queue_name: &str) -> Option<&'static str> {
        self.workers.get(queue_name).map(|h| *h)
    }

    /// Names of all queues with a bound handler, sorted.
    pub fn queues(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// Resolved queue handles, so each name is looked up remotely at most once
/// in the common case.
///
/// Unlike [`WorkerRegistry`] this is not process-wide: each adapter owns one
/// (shared by its clones), because a handle is only meaningful to the
/// transport that resolved it. Two adapters over different transports may
/// resolve the same queue name to different handles.
#[derive(Debug, Default)]
pub struct QueueCache {
    handles: DashMap<String, QueueHandle>,
}

impl QueueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle for `queue_name`, resolving through `transport` on a miss.
    pub async fn resolve(
        &self,
        transport: &dyn QueueTransport,
        queue_name: &str,
    ) -> Result<QueueHandle, TransportError> {
        // Clone out so no shard lock is held across the await below.
        if let Some(handle) = self.handles.get(queue_name).map(|h| h.clone()) {
            return Ok(handle);
        }

        let handle = transport.resolve(queue_name).await?;
        debug!(queue = queue_name, fifo = handle.fifo, "resolved queue handle");
        Ok(self
            .handles
            .entry(queue_name.to_owned())
            .or_insert(handle)
            .clone())
    }

    #[inline]
    pub fn get(&self, queue_name: &str) -> Option<QueueHandle> {
        self.handles.get(queue_name).map(|h| h.clone())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
