//! The per-attempt handle a strategy receives (`spec.md` §4.4).

use std::sync::Arc;

use async_trait::async_trait;
use flowcraft_blueprint::Blueprint;
use flowcraft_context::AsyncContext;
use flowcraft_core::ids::{BlueprintId, NodeId, RunId};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ActionError;
use crate::result::StrategyResult;

/// The orchestrator-provided entry points a strategy calls back into for
/// `subflow`, `parallel-container`, and `loop` node kinds.
///
/// Defined here rather than in `flowcraft-engine` so this crate never
/// depends on the orchestrator crate; `flowcraft-engine`'s `Runtime`
/// implements this trait and hands an `Arc<dyn GraphCallback>` to every
/// [`ActionContext`] it builds.
#[async_trait]
pub trait GraphCallback: Send + Sync {
    /// Run a single node of the *current* blueprint out of band (used by
    /// `parallel-container` to fan out over its child nodes).
    async fn run_node(&self, node_id: &NodeId, input: Value) -> Result<StrategyResult, ActionError>;

    /// Run `blueprint` to completion as a nested execution, returning its
    /// terminal outputs object (used by `subflow`).
    async fn run_subflow(
        &self,
        blueprint: &Blueprint,
        input: Value,
    ) -> Result<Value, ActionError>;
}

/// Everything a strategy needs to execute one attempt of one node.
#[derive(Clone)]
pub struct ActionContext {
    /// The run this attempt belongs to.
    pub run_id: RunId,
    /// The blueprint being executed.
    pub blueprint_id: BlueprintId,
    /// The node being executed.
    pub node_id: NodeId,
    /// 1-based attempt number; `1` on the first try.
    pub attempt: u32,
    /// Resolved input for this attempt, per `spec.md` §4.4 step 1.
    pub input: Value,
    /// The run's shared context store, for strategies that need
    /// side-channel reads/writes beyond their own output (e.g. `batch`'s
    /// `params.outputKey`).
    pub shared: Arc<dyn AsyncContext>,
    /// Cooperative cancellation for the whole run.
    pub cancellation: CancellationToken,
    /// Callback into the orchestrator for `subflow`/`parallel-container`/
    /// `loop` node kinds. `None` when no orchestrator is attached, e.g.
    /// in unit tests of strategies that never use it.
    pub graph: Option<Arc<dyn GraphCallback>>,
}

impl ActionContext {
    /// Whether the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fetch the [`GraphCallback`], failing with [`ActionError::Fatal`]
    /// when a strategy that needs it was run without one attached.
    pub fn require_graph(&self) -> Result<&Arc<dyn GraphCallback>, ActionError> {
        self.graph
            .as_ref()
            .ok_or_else(|| ActionError::Fatal("no graph callback attached to this context".into()))
    }
}
