//! The execution event bus and its event vocabulary (`spec.md` §6,
//! "Event bus events").

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;

/// Every event the engine may emit over the course of a run.
///
/// Ids are plain strings rather than `flowcraft-core` newtypes so this
/// crate has no dependency on the blueprint/core crates and can sit at
/// the bottom of the dependency graph alongside them.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ExecutionEvent {
    /// `workflow:start` — a run has begun.
    WorkflowStart {
        /// The run's id.
        execution_id: String,
        /// The blueprint being run.
        blueprint_id: String,
    },
    /// `workflow:finish` — a run reached a terminal status.
    WorkflowFinish {
        /// The run's id.
        execution_id: String,
        /// One of `"completed" | "failed" | "cancelled" | "stalled"`.
        status: String,
    },
    /// `node:start` — a node began executing.
    NodeStart {
        /// The run's id.
        execution_id: String,
        /// The node that started.
        node_id: String,
    },
    /// `node:finish` — a node's output was published.
    NodeFinish {
        /// The run's id.
        execution_id: String,
        /// The node that finished.
        node_id: String,
        /// Wall-clock time spent executing the node, across all attempts.
        duration: Duration,
    },
    /// `node:error` — a node's strategy produced an error that survived
    /// retries and had no fallback (or the fallback itself failed).
    NodeError {
        /// The run's id.
        execution_id: String,
        /// The node that errored.
        node_id: String,
        /// A human-readable description of the error.
        error: String,
    },
    /// `node:retry` — a node is being retried after a failed attempt.
    NodeRetry {
        /// The run's id.
        execution_id: String,
        /// The node being retried.
        node_id: String,
        /// The attempt number about to run (1-based).
        attempt: u32,
    },
    /// `node:fallback` — a node's fallback function was invoked.
    NodeFallback {
        /// The run's id.
        execution_id: String,
        /// The node whose fallback ran.
        node_id: String,
    },
    /// `context:change` — a key in the run's context was mutated.
    ContextChange {
        /// The run's id.
        execution_id: String,
        /// The node that caused the change, if attributable.
        source_node: Option<String>,
        /// The key that changed.
        key: String,
    },
    /// `job:enqueued` — a job envelope was placed on the queue.
    JobEnqueued {
        /// The run's id.
        execution_id: String,
        /// The node the job will execute.
        node_id: String,
    },
    /// `job:processed` — a worker finished handling a job (success or failure).
    JobProcessed {
        /// The run's id.
        execution_id: String,
        /// The node the job executed.
        node_id: String,
    },
    /// `job:failed` — a worker's job handler raised an unrecoverable error.
    JobFailed {
        /// The run's id.
        execution_id: String,
        /// The node the job was for.
        node_id: String,
        /// A human-readable description of the failure.
        reason: String,
    },
}

/// A broadcast-backed event bus.
///
/// Subscribers that fall behind see [`broadcast::error::RecvError::Lagged`]
/// on their next `recv`, which [`EventSubscriber::recv`] treats as a
/// signal to keep reading rather than a fatal error.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
    emitted: AtomicU64,
}

impl EventBus {
    /// Create a new bus with the given per-subscriber buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, emitted: AtomicU64::new(0) }
    }

    /// Publish an event to all current subscribers. A no-op if there are
    /// none (broadcast channels do not buffer with zero receivers).
    pub fn emit(&self, event: ExecutionEvent) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(event);
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber { receiver: self.sender.subscribe() }
    }

    /// Total number of events ever published, including to zero subscribers.
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Number of currently active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A handle to receive events from an [`EventBus`].
pub struct EventSubscriber {
    receiver: broadcast::Receiver<ExecutionEvent>,
}

impl EventSubscriber {
    /// Await the next event, transparently skipping past a lag gap.
    /// Returns `None` once the bus itself has been dropped.
    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` if nothing is queued right now.
    pub fn try_recv(&mut self) -> Option<ExecutionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                _ => return None,
            }
        }
    }
}
