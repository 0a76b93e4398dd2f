//! Bulk submission grouped by queue.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, warn};

use crate::adapter::JobQueueAdapter;
use crate::delay::delay_until;
use crate::error::JobQueueError;
use crate::job::Job;
use crate::types::{BatchEntry, BatchFailure, EnqueueAllReport, JobOutcome, QueueHandle, WireMessage};

/// Input positions of the jobs bound for one queue, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueGroup {
    pub queue_name: String,
    pub indices: Vec<usize>,
}

/// Partition `jobs` by queue name. Groups appear in order of each queue's
/// first job; within a group the input order is kept.
pub fn group_by_queue<J: Job>(jobs: &[J]) -> Vec<QueueGroup> {
    let mut groups: Vec<QueueGroup> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (index, job) in jobs.iter().enumerate() {
        let name = job.queue_name();
        match positions.get(name) {
            Some(&pos) => groups[pos].indices.push(index),
            None => {
                positions.insert(name, groups.len());
                groups.push(QueueGroup {
                    queue_name: name.to_owned(),
                    indices: vec![index],
                });
            }
        }
    }
    groups
}

/// A queue group with every message already built.
struct PreparedGroup {
    queue: QueueHandle,
    messages: Vec<(usize, WireMessage)>,
}

impl JobQueueAdapter {
    /// Send many jobs with one batch send per queue (or per chunk when
    /// `max_batch_entries` is configured).
    ///
    /// Every delay is computed and every message built before anything is
    /// sent, so an invalid delay or a serialization failure sends nothing.
    /// Sends are not transactional: when a batch send itself fails, the
    /// error carries the count and the per-job outcomes of every earlier send,
    /// so callers can tell exactly which jobs still need submitting.
    pub async fn enqueue_all<J: Job>(&self, jobs: &[J]) -> Result<EnqueueAllReport, JobQueueError> {
        let now = Utc::now();
        let groups = group_by_queue(jobs);

        let mut prepared = Vec::with_capacity(groups.len());
        for group in groups {
            self.register_worker(&group.queue_name);
            let queue = self.queue(&group.queue_name).await?;

            let mut messages = Vec::with_capacity(group.indices.len());
            for index in group.indices {
                let job = &jobs[index];
                let mut options = job.send_options();
                if let Some(at) = job.scheduled_at() {
                    options.delay_seconds = Some(delay_until(at, now)?);
                }
                messages.push((index, self.builder.build_with(&queue, job, options)?));
            }
            prepared.push(PreparedGroup { queue, messages });
        }

        let mut outcomes: Vec<Option<JobOutcome>> = vec![None; jobs.len()];
        let mut enqueued = 0;

        for group in prepared {
            let chunk_size = self
                .max_batch_entries
                .unwrap_or(group.messages.len())
                .max(1);
            let mut group_enqueued = 0;

            for chunk in group.messages.chunks(chunk_size) {
                let entries = chunk
                    .iter()
                    .enumerate()
                    .map(|(id, (_, message))| BatchEntry {
                        id: id.to_string(),
                        message: message.clone(),
                    })
                    .collect();

                let output = match self.transport.send_message_batch(&group.queue, entries).await {
                    Ok(output) => output,
                    Err(source) => {
                        return Err(JobQueueError::BatchInterrupted {
                            queue_name: group.queue.name.clone(),
                            enqueued,
                            completed: outcomes.into_iter().flatten().collect(),
                            source,
                        })
                    }
                };

                let mut results: HashMap<String, Result<String, BatchFailure>> =
                    HashMap::with_capacity(chunk.len());
                for success in output.successful {
                    results.insert(success.id, Ok(success.message_id));
                }
                for failure in output.failed {
                    warn!(
                        queue = %group.queue.name,
                        entry = %failure.id,
                        code = %failure.code,
                        reason = %failure.message,
                        "batch entry rejected"
                    );
                    results.insert(failure.id.clone(), Err(failure));
                }

                for (id, (index, message)) in chunk.iter().enumerate() {
                    let id = id.to_string();
                    let result = results.remove(&id).unwrap_or_else(|| {
                        Err(BatchFailure {
                            id,
                            code: "MissingResult".to_owned(),
                            message: "transport reported no result for this entry".to_owned(),
                            sender_fault: false,
                        })
                    });
                    if result.is_ok() {
                        enqueued += 1;
                        group_enqueued += 1;
                    }
                    outcomes[*index] = Some(JobOutcome {
                        index: *index,
                        queue_name: group.queue.name.clone(),
                        message: message.clone(),
                        result,
                    });
                }
            }

            info!(
                queue = %group.queue.name,
                jobs = group.messages.len(),
                enqueued = group_enqueued,
                "enqueued batch"
            );
        }

        Ok(EnqueueAllReport {
            enqueued,
            outcomes: outcomes.into_iter().flatten().collect(),
        })
    }
}
