//! Deterministic, single-node-at-a-time execution (`spec.md` §2, row 10),
//! generalized from `Orchestrator::run_to_boundary`'s live-frontier loop
//! (`flowcraft-engine/src/orchestrator.rs`): instead of draining the
//! frontier under a semaphore, [`Stepper::next`] runs exactly one ready
//! node and returns, and [`Stepper::prev`]/[`Stepper::reset`] rewind by
//! replaying a snapshot history rather than mutating live state.

use std::collections::HashSet;
use std::sync::Arc;

use flowcraft_action::{
    ActionContext, Executor, ExecutionBudget, Middleware, StrategyOutput, StrategyRegistry,
    StrategyResult, UserFunctionRegistry,
};
use flowcraft_blueprint::Blueprint;
use flowcraft_context::{AsyncContext, InMemoryAsyncContext};
use flowcraft_core::ids::{NodeId, RunId};
use flowcraft_core::reserved;
use flowcraft_engine::runtime::apply_edge_transform;
use flowcraft_engine::Traverser;
use flowcraft_expression::Evaluator;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::StepperError;
use crate::outcome::StepOutcome;

/// One committed step, kept so [`Stepper::prev`] can rewind by
/// reconstructing rather than undoing live mutation.
struct HistoryEntry {
    context_before: Value,
    outcome: StepOutcome,
}

/// Drives one blueprint one node at a time for debugging and tests.
///
/// Holds the same [`Traverser`] and [`Executor`] the in-process
/// [`flowcraft_engine::Runtime`] uses, but never spawns concurrent tasks
/// and never re-enters itself for `subflow`/`loop`/`parallel-container`
/// nodes (`ActionContext::graph` is always `None`) — a deliberate scope
/// reduction for a tool meant to single-step one graph at a time.
pub struct Stepper {
    blueprint: Blueprint,
    run_id: RunId,
    executor: Executor,
    evaluator: Evaluator,
    traverser: Traverser,
    shared: Arc<dyn AsyncContext>,
    initial_snapshot: Value,
    awaiting: HashSet<NodeId>,
    failed: HashSet<NodeId>,
    history: Vec<HistoryEntry>,
}

impl Stepper {
    /// Analyze `blueprint`, seed a fresh context with `initial_context`
    /// at every start node's `_inputs.<id>`, and build a stepper with the
    /// built-in strategy registry and no user functions or middleware.
    ///
    /// # Errors
    ///
    /// Returns [`StepperError::Blueprint`] if blueprint analysis rejects
    /// the graph (unknown node, duplicate id, empty graph).
    pub async fn new(blueprint: Blueprint, initial_context: Value) -> Result<Self, StepperError> {
        Self::with_executor(blueprint, initial_context, Executor::new()).await
    }

    /// As [`Stepper::new`], but with a caller-supplied executor (already
    /// carrying whichever strategies/functions/middleware/budget it needs).
    pub async fn with_executor(blueprint: Blueprint, initial_context: Value, executor: Executor) -> Result<Self, StepperError> {
        let traverser = Traverser::new(blueprint.clone())?;
        let shared: Arc<dyn AsyncContext> = Arc::new(InMemoryAsyncContext::new());
        for start in &traverser.analysis().start_node_ids {
            shared.set(&reserved::input_key(start.as_str()), initial_context.clone()).await?;
        }
        let initial_snapshot = shared.to_json().await?;
        Ok(Self {
            blueprint,
            run_id: RunId::new(),
            executor,
            evaluator: Evaluator::sandboxed(),
            traverser,
            shared,
            initial_snapshot,
            awaiting: HashSet::new(),
            failed: HashSet::new(),
            history: Vec::new(),
        })
    }

    /// Register user functions, builder-style.
    #[must_use]
    pub fn with_functions(mut self, functions: UserFunctionRegistry) -> Self {
        self.executor = self.executor.with_functions(functions);
        self
    }

    /// Swap in a different strategy registry, builder-style.
    #[must_use]
    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.executor = self.executor.with_strategies(strategies);
        self
    }

    /// Append a middleware, builder-style.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.executor = self.executor.with_middleware(middleware);
        self
    }

    /// Override the default resource budget, builder-style.
    #[must_use]
    pub fn with_budget(mut self, budget: ExecutionBudget) -> Self {
        self.executor = self.executor.with_budget(budget);
        self
    }

    /// This stepper's synthetic run id.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// A snapshot of the run's context as of the most recent step.
    ///
    /// # Errors
    ///
    /// Returns [`StepperError::Context`] if the backing store rejects
    /// the read.
    pub async fn context(&self) -> Result<Value, StepperError> {
        Ok(self.shared.to_json().await?)
    }

    /// Every node whose output has been stored.
    #[must_use]
    pub fn completed_nodes(&self) -> Vec<NodeId> {
        self.blueprint
            .nodes
            .iter()
            .map(|n| &n.id)
            .filter(|id| self.traverser.is_completed(id))
            .cloned()
            .collect()
    }

    /// Whether every terminal node has completed, no node is failed, and
    /// nothing is suspended — i.e. [`Stepper::next`] has nothing left to do.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.failed.is_empty() && self.awaiting.is_empty() && self.traverser.all_terminal_nodes_completed()
    }

    /// The steps taken so far, most recent last.
    #[must_use]
    pub fn history(&self) -> Vec<&StepOutcome> {
        self.history.iter().map(|e| &e.outcome).collect()
    }

    fn excluded(&self) -> HashSet<NodeId> {
        self.awaiting.union(&self.failed).cloned().collect()
    }

    /// Run exactly one ready node and return what happened, or `None` if
    /// no node is currently ready (the run is finished, stalled, or every
    /// remaining node is suspended or failed).
    ///
    /// # Errors
    ///
    /// Returns [`StepperError::Context`] if the context store rejects a
    /// read or write.
    pub async fn next(&mut self) -> Result<Option<StepOutcome>, StepperError> {
        let excluded = self.excluded();
        let ready = self.traverser.ready_nodes(&excluded);
        let Some(node_id) = ready.into_iter().next() else {
            return Ok(None);
        };
        self.traverser.mark_scheduled(&node_id);

        let context_before = self.shared.to_json().await?;
        let node = self.blueprint.node(&node_id).cloned().expect("ready node exists in its own blueprint");
        let predecessors: Vec<String> = self
            .traverser
            .analysis()
            .predecessors_of(&node_id)
            .iter()
            .map(NodeId::to_string)
            .collect();
        let scope_map = match context_before.clone() {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let ctx = ActionContext {
            run_id: self.run_id,
            blueprint_id: self.blueprint.id.clone(),
            node_id: node_id.clone(),
            attempt: 1,
            input: Value::Null,
            shared: self.shared.clone(),
            cancellation: CancellationToken::new(),
            graph: None,
        };

        let outcome = match self.executor.execute_node(&node, &predecessors, &scope_map, ctx).await {
            Ok(StrategyResult::Complete(output)) => {
                self.commit_completion(&node_id, output).await?;
                let value = self.shared.get(&reserved::output_key(node_id.as_str())).await?.unwrap_or(Value::Null);
                StepOutcome::Completed { node_id: node_id.clone(), output: value }
            }
            Ok(StrategyResult::Suspend(reason)) => {
                self.awaiting.insert(node_id.clone());
                StepOutcome::Suspended { node_id: node_id.clone(), reason }
            }
            Err(err) => {
                self.failed.insert(node_id.clone());
                StepOutcome::Failed { node_id: node_id.clone(), reason: err.to_string() }
            }
        };

        self.history.push(HistoryEntry { context_before, outcome: outcome.clone() });
        Ok(Some(outcome))
    }

    /// Resolve a node parked by [`Stepper::next`] returning
    /// [`StepOutcome::Suspended`], as if `resume(runId, nodeId, payload)`
    /// had been called (`spec.md` §4.8). The stepper treats every
    /// suspension reason uniformly: the caller supplies the payload and
    /// the node completes with it, regardless of whether it was parked
    /// on a sleep, an event, or a webhook.
    ///
    /// # Errors
    ///
    /// Returns [`StepperError::NotAwaiting`] if `node_id` is not
    /// currently suspended.
    pub async fn resume(&mut self, node_id: &NodeId, payload: Value) -> Result<StepOutcome, StepperError> {
        if !self.awaiting.remove(node_id) {
            return Err(StepperError::NotAwaiting(node_id.clone()));
        }
        let context_before = self.shared.to_json().await?;
        self.commit_completion(node_id, StrategyOutput::new(payload)).await?;
        let value = self.shared.get(&reserved::output_key(node_id.as_str())).await?.unwrap_or(Value::Null);
        let outcome = StepOutcome::Completed { node_id: node_id.clone(), output: value };
        self.history.push(HistoryEntry { context_before, outcome: outcome.clone() });
        Ok(outcome)
    }

    async fn commit_completion(&mut self, node_id: &NodeId, output: StrategyOutput) -> Result<(), StepperError> {
        self.shared.set(&reserved::output_key(node_id.as_str()), output.output.clone()).await?;
        self.traverser.mark_completed(node_id.clone());

        let eval_scope = serde_json::json!({"result": output.output, "context": self.shared.to_json().await?});
        let edges: Vec<_> = self
            .traverser
            .determine_next_nodes(node_id, &output, &self.evaluator, &eval_scope)
            .into_iter()
            .cloned()
            .collect();
        for edge in &edges {
            apply_edge_transform(&self.evaluator, edge, &output.output, self.shared.as_ref()).await?;
        }
        self.traverser.inject_dynamic(output.dynamic_nodes, output.dynamic_edges)?;
        Ok(())
    }

    /// Undo the most recent [`Stepper::next`]/[`Stepper::resume`] call,
    /// restoring the context exactly as it was before that step ran.
    ///
    /// Returns `false` with no effect if there is no step to undo.
    ///
    /// # Errors
    ///
    /// Returns [`StepperError::Blueprint`] if rebuilding the traverser
    /// over the (unchanged) blueprint somehow fails — practically
    /// unreachable since the blueprint analyzed cleanly in [`Stepper::new`].
    pub fn prev(&mut self) -> Result<bool, StepperError> {
        let Some(entry) = self.history.pop() else { return Ok(false) };
        self.rebuild_from(entry.context_before)?;
        Ok(true)
    }

    /// Rewind all the way back to the state right after construction.
    ///
    /// # Errors
    ///
    /// See [`Stepper::prev`].
    pub fn reset(&mut self) -> Result<(), StepperError> {
        self.history.clear();
        self.rebuild_from(self.initial_snapshot.clone())
    }

    /// Rebuild the traverser, awaiting/failed sets, and context from
    /// `snapshot`, re-deriving completion from which `_outputs.<id>`
    /// keys are present (`spec.md` §3, "absence of that key ⇔ the node
    /// has not completed").
    fn rebuild_from(&mut self, snapshot: Value) -> Result<(), StepperError> {
        let mut traverser = Traverser::new(self.blueprint.clone())?;
        for node in &self.blueprint.nodes {
            let has_output = snapshot
                .as_object()
                .and_then(|m| m.get(&reserved::output_key(node.id.as_str())))
                .is_some();
            if has_output {
                traverser.mark_completed(node.id.clone());
            }
        }
        self.traverser = traverser;
        self.shared = Arc::new(InMemoryAsyncContext::from_initial(snapshot));
        self.awaiting.clear();
        self.failed.clear();
        Ok(())
    }
}
