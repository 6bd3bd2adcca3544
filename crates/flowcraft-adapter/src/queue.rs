//! The job queue wire shape and the `QueueBinding` port (`spec.md` §6,
//! §9 "compose via a `QueueBinding` interface"). `processJobs` from the
//! spec's note is split here into explicit `dequeue`/`ack`/`nack`
//! primitives, a more idiomatic shape than a callback-driven pump loop.

use std::collections::VecDeque;

use async_trait::async_trait;
use flowcraft_core::ids::{BlueprintId, NodeId, RunId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdapterError;

/// A job queue message body (`spec.md` §6): `{"runId","blueprintId","nodeId"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// The run this job belongs to.
    pub run_id: RunId,
    /// The blueprint the run was started from.
    pub blueprint_id: BlueprintId,
    /// The node to execute.
    pub node_id: NodeId,
}

impl JobEnvelope {
    /// A job for `node_id` within `run_id`/`blueprint_id`.
    #[must_use]
    pub fn new(run_id: RunId, blueprint_id: BlueprintId, node_id: NodeId) -> Self {
        Self { run_id, blueprint_id, node_id }
    }
}

/// Terminal status published once a run finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    /// Every terminal node produced an output.
    Completed,
    /// A node failed fatally, or failed after exhausting retries with
    /// no fallback, under `strict` propagation.
    Failed,
    /// The run was cancelled cooperatively.
    Cancelled,
}

/// The final-result payload published to a results sink (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResultEnvelope {
    /// The run's terminal status.
    pub status: FinalStatus,
    /// `{context, serializedContext, status}`, carried opaquely.
    pub payload: Value,
    /// Present only when `status != completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The small interface `BaseAdapter` composes against instead of
/// subclassing a queue-specific adapter (`spec.md` §9): enqueue a job,
/// pull the next job with an ack/nack handle, and publish a run's final
/// result.
#[async_trait]
pub trait QueueBinding: Send + Sync {
    /// Push `job` onto the queue.
    async fn enqueue(&self, job: JobEnvelope) -> Result<(), AdapterError>;

    /// Pull the next available job, if any, without blocking.
    async fn dequeue(&self) -> Result<Option<JobEnvelope>, AdapterError>;

    /// Acknowledge successful processing of a job pulled via `dequeue`.
    async fn ack(&self, job: &JobEnvelope) -> Result<(), AdapterError>;

    /// Return a job to the queue for at-least-once redelivery.
    async fn nack(&self, job: JobEnvelope) -> Result<(), AdapterError>;

    /// Publish a run's terminal result to the results sink.
    async fn publish_final_result(&self, run_id: RunId, result: FinalResultEnvelope) -> Result<(), AdapterError>;
}

fn _assert_queue_binding_is_object_safe(_: &dyn QueueBinding) {}
fn _takes_boxed_queue_binding(_: Box<dyn QueueBinding>) {}

/// A process-local FIFO `QueueBinding` for tests and single-process
/// deployments; published final results are retained for inspection.
#[derive(Default)]
pub struct InMemoryQueueBinding {
    jobs: Mutex<VecDeque<JobEnvelope>>,
    published: Mutex<Vec<(RunId, FinalResultEnvelope)>>,
}

impl InMemoryQueueBinding {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self { jobs: Mutex::new(VecDeque::new()), published: Mutex::new(Vec::new()) }
    }

    /// Results published so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<(RunId, FinalResultEnvelope)> {
        self.published.lock().clone()
    }

    /// How many jobs are currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[async_trait]
impl QueueBinding for InMemoryQueueBinding {
    async fn enqueue(&self, job: JobEnvelope) -> Result<(), AdapterError> {
        self.jobs.lock().push_back(job);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<JobEnvelope>, AdapterError> {
        Ok(self.jobs.lock().pop_front())
    }

    async fn ack(&self, _job: &JobEnvelope) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn nack(&self, job: JobEnvelope) -> Result<(), AdapterError> {
        self.jobs.lock().push_back(job);
        Ok(())
    }

    async fn publish_final_result(&self, run_id: RunId, result: FinalResultEnvelope) -> Result<(), AdapterError> {
        self.published.lock().push((run_id, result));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn jobs_dequeue_fifo() {
        let q = InMemoryQueueBinding::new();
        let run = RunId::new();
        let bp = BlueprintId::from("bp");
        q.enqueue(JobEnvelope::new(run, bp.clone(), NodeId::from("a"))).await.unwrap();
        q.enqueue(JobEnvelope::new(run, bp.clone(), NodeId::from("b"))).await.unwrap();
        let first = q.dequeue().await.unwrap().unwrap();
        assert_eq!(first.node_id, NodeId::from("a"));
        let second = q.dequeue().await.unwrap().unwrap();
        assert_eq!(second.node_id, NodeId::from("b"));
        assert!(q.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nack_requeues_for_redelivery() {
        let q = InMemoryQueueBinding::new();
        let job = JobEnvelope::new(RunId::new(), BlueprintId::from("bp"), NodeId::from("a"));
        q.enqueue(job.clone()).await.unwrap();
        let pulled = q.dequeue().await.unwrap().unwrap();
        q.nack(pulled).await.unwrap();
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn publish_final_result_is_retained() {
        let q = InMemoryQueueBinding::new();
        let run = RunId::new();
        q.publish_final_result(
            run,
            FinalResultEnvelope {
                status: FinalStatus::Completed,
                payload: serde_json::json!({"context": {}, "serializedContext": "{}", "status": "completed"}),
                reason: None,
            },
        )
        .await
        .unwrap();
        let published = q.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1.status, FinalStatus::Completed);
    }
}
