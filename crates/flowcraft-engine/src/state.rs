//! Per-run execution state (`spec.md` §4.5, §6 "Final-result payload").

use std::collections::HashMap;

use flowcraft_core::ids::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node's lifecycle within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Not yet ready: at least one predecessor has not completed.
    Pending,
    /// Ready to run but not yet scheduled.
    Ready,
    /// Currently executing.
    Running,
    /// Finished successfully; its output is present at `_outputs.<id>`.
    Completed,
    /// Parked on a `wait` strategy; resumes via `Runtime::resume`.
    Awaiting,
    /// Failed and exhausted retries/fallback.
    Failed,
    /// Lost an `"any"` join race, or a successor of a poisoned predecessor.
    Cancelled,
}

/// The terminal (or in-flight) status of a run (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Still scheduling nodes.
    Running,
    /// Parked on at least one `wait` strategy with no other work left.
    Awaiting,
    /// Every terminal node completed.
    Completed,
    /// A fatal error, or a non-fatal error under `strict` mode, ended the run.
    Failed,
    /// The cancellation token fired.
    Cancelled,
    /// The frontier emptied without all terminal nodes completing
    /// (`spec.md` §8, boundary behavior).
    Stalled,
}

/// Tracks each node's lifecycle plus the errors recorded against the run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    /// Per-node lifecycle state.
    pub node_states: HashMap<NodeId, NodeState>,
    /// `(nodeId, message)` pairs recorded for failed nodes, in the order
    /// they failed.
    pub errors: Vec<(NodeId, String)>,
}

impl ExecutionState {
    /// Seed state with every blueprint node `Pending`, then promote the
    /// given start nodes to `Ready`.
    #[must_use]
    pub fn seed(all_nodes: &[NodeId], start_nodes: &[NodeId]) -> Self {
        let mut node_states: HashMap<NodeId, NodeState> =
            all_nodes.iter().map(|id| (id.clone(), NodeState::Pending)).collect();
        for id in start_nodes {
            node_states.insert(id.clone(), NodeState::Ready);
        }
        Self { node_states, errors: Vec::new() }
    }

    /// Record a node transition, inserting it if unseen (dynamic nodes).
    pub fn transition(&mut self, node: NodeId, state: NodeState) {
        self.node_states.insert(node, state);
    }

    /// Record a failure against `node`.
    pub fn record_error(&mut self, node: NodeId, message: String) {
        self.errors.push((node, message));
    }
}

/// The outcome of `Runtime::run` (`spec.md` §4.6, §6).
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    /// The run's final context snapshot.
    pub context: Value,
    /// A stable JSON-string serialization of `context`.
    pub serialized_context: String,
    /// The run's terminal (or `"awaiting"`) status.
    pub status: ExecutionStatus,
    /// Human-readable error messages recorded during the run, if any.
    pub errors: Vec<String>,
}
