//! The live-frontier scheduling loop (`spec.md` §4.5), generalized from
//! `nebula-engine::engine::WorkflowEngine::spawn_level`'s static
//! per-level barrier into permits acquired per ready node rather than
//! per static level (`SPEC_FULL.md` §5).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowcraft_action::context::GraphCallback;
use flowcraft_action::{ActionContext, ActionError, StrategyResult};
use flowcraft_blueprint::Blueprint;
use flowcraft_context::AsyncContext;
use flowcraft_core::error::Classify;
use flowcraft_core::ids::{BlueprintId, NodeId, RunId};
use flowcraft_core::reserved;
use flowcraft_telemetry::ExecutionEvent;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::runtime::{apply_edge_transform, Runtime, RuntimeOptions};
use crate::scheduler::Awaiting;
use crate::state::{ExecutionState, ExecutionStatus, NodeState, WorkflowResult};
use crate::traverser::Traverser;

/// Polling interval the in-process orchestrator uses while a `sleep`
/// suspension is pending but not yet due.
const SLEEP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Where [`Orchestrator::run_to_boundary`] stopped: either the run
/// reached a terminal status, or it emptied its frontier with only
/// external (`waitForEvent`/`waitForWebhook`) suspensions left pending.
pub(crate) enum Boundary {
    Finished(WorkflowResult),
    Awaiting,
}

/// Owns one run's traverser, shared context, and in-flight task set.
/// Also implements [`GraphCallback`] so its own strategies (`loop`,
/// `subflow`, `parallel-container`) can re-enter this same run.
pub(crate) struct Orchestrator {
    runtime: Arc<Runtime>,
    run_id: RunId,
    options: RuntimeOptions,
    traverser: Mutex<Traverser>,
    shared: Arc<dyn AsyncContext>,
    /// The raw `run()` input, seeded as `_inputs.<id>` for every start node
    /// once traversal begins (`spec.md` §4.4 step 1, "entry nodes").
    initial_context: Value,
    state: Mutex<ExecutionState>,
    cancellation: CancellationToken,
}

impl Orchestrator {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        blueprint: Blueprint,
        initial_context: Value,
        options: RuntimeOptions,
    ) -> Result<Self, EngineError> {
        let run_id = RunId::new();
        let shared = flowcraft_context::InMemoryAsyncContext::new();
        let traverser = Traverser::new(blueprint)?;
        let all_nodes: Vec<NodeId> = traverser.blueprint().nodes.iter().map(|n| n.id.clone()).collect();
        let start_nodes = traverser.analysis().start_node_ids.clone();
        let state = ExecutionState::seed(&all_nodes, &start_nodes);
        Ok(Self {
            runtime,
            run_id,
            options,
            traverser: Mutex::new(traverser),
            shared: Arc::new(shared),
            initial_context,
            state: Mutex::new(state),
            cancellation: CancellationToken::new(),
        })
    }

    /// This run's id.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The run's shared context store.
    #[must_use]
    pub fn context(&self) -> Arc<dyn AsyncContext> {
        self.shared.clone()
    }

    /// Request cancellation; in-flight nodes are allowed to finish or
    /// fail naturally, but no new node is scheduled (`spec.md` §4.5).
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Write `payload` as `node`'s output and mark it completed, for a
    /// node parked on `waitForEvent`/`waitForWebhook` (`spec.md` §4.8:
    /// "the node's output is set only when `resume` supplies a value").
    pub(crate) async fn resolve_awaiting(self: &Arc<Self>, node: &NodeId, payload: Value) -> Result<(), EngineError> {
        self.runtime.scheduler().take(self.run_id, node);
        self.publish(node, payload, None).await?;
        Ok(())
    }

    async fn emit(&self, event_fn: impl FnOnce(String) -> ExecutionEvent) {
        self.runtime.events().emit(event_fn(self.run_id.to_string()));
    }

    fn predecessors_of(&self, node: &NodeId, traverser: &Traverser) -> Vec<String> {
        traverser.analysis().predecessors_of(node).iter().map(NodeId::to_string).collect()
    }

    async fn action_context(&self, node_id: NodeId, blueprint_id: BlueprintId, input: Value, graph: Arc<dyn GraphCallback>) -> ActionContext {
        ActionContext {
            run_id: self.run_id,
            blueprint_id,
            node_id,
            attempt: 1,
            input,
            shared: self.shared.clone(),
            cancellation: self.cancellation.clone(),
            graph: Some(graph),
        }
    }

    /// Run until the run finishes, stalls, fails, is cancelled, or empties
    /// its frontier with only `waitForEvent`/`waitForWebhook` suspensions
    /// left pending.
    pub(crate) async fn run_to_boundary(self: Arc<Self>) -> Result<Boundary, EngineError> {
        let blueprint_id = self.traverser.lock().await.blueprint().id.to_string();
        self.emit(|execution_id| ExecutionEvent::WorkflowStart {
            execution_id,
            blueprint_id,
        })
        .await;

        for start in self.traverser.lock().await.analysis().start_node_ids.clone() {
            self.shared
                .set(&reserved::input_key(start.as_str()), self.initial_context.clone())
                .await?;
        }

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.unwrap_or(usize::MAX)));
        let mut join_set: JoinSet<(NodeId, Result<StrategyResult, ActionError>)> = JoinSet::new();
        let mut in_flight: HashSet<NodeId> = HashSet::new();

        loop {
            if self.cancellation.is_cancelled() && join_set.is_empty() {
                return self.finish(ExecutionStatus::Cancelled).await.map(Boundary::Finished);
            }

            if !self.cancellation.is_cancelled() {
                let ready = {
                    let mut traverser = self.traverser.lock().await;
                    let ready = traverser.ready_nodes(&in_flight);
                    for node in &ready {
                        traverser.mark_scheduled(node);
                    }
                    ready
                };
                for node_id in ready {
                    in_flight.insert(node_id.clone());
                    self.spawn_node(&mut join_set, semaphore.clone(), node_id).await;
                }
            }

            if !join_set.is_empty() {
                if let Some(joined) = join_set.join_next().await {
                    let (node_id, result) = joined.map_err(|e| {
                        EngineError::Action(ActionError::Fatal(format!("node task panicked: {e}")))
                    })?;
                    in_flight.remove(&node_id);
                    self.handle_node_result(node_id, result).await?;
                }
                continue;
            }

            // Nothing running and nothing newly ready: check the scheduler.
            let due = self
                .runtime
                .scheduler()
                .tick()
                .into_iter()
                .filter(|(run, _)| *run == self.run_id)
                .map(|(_, node)| node)
                .collect::<Vec<_>>();
            if !due.is_empty() {
                for node in due {
                    self.publish(&node, Value::Null, None).await?;
                }
                continue;
            }

            let pending = self.runtime.scheduler().snapshot_for_run(self.run_id);
            let has_pending_sleep = pending.iter().any(|(_, a)| matches!(a, Awaiting::Sleep { .. }));
            if has_pending_sleep {
                tokio::time::sleep(SLEEP_POLL_INTERVAL).await;
                continue;
            }
            if !pending.is_empty() {
                return Ok(Boundary::Awaiting);
            }

            let status = {
                let traverser = self.traverser.lock().await;
                let state = self.state.lock().await;
                if self.cancellation.is_cancelled() {
                    ExecutionStatus::Cancelled
                } else if !state.errors.is_empty() {
                    ExecutionStatus::Failed
                } else if traverser.all_terminal_nodes_completed() {
                    ExecutionStatus::Completed
                } else {
                    ExecutionStatus::Stalled
                }
            };
            return self.finish(status).await.map(Boundary::Finished);
        }
    }

    async fn spawn_node(
        self: &Arc<Self>,
        join_set: &mut JoinSet<(NodeId, Result<StrategyResult, ActionError>)>,
        semaphore: Arc<Semaphore>,
        node_id: NodeId,
    ) {
        let this = self.clone();
        join_set.spawn(async move {
            let permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let (node, predecessors, blueprint_id) = {
                let traverser = this.traverser.lock().await;
                let node = traverser.blueprint().node(&node_id).cloned();
                let predecessors = node.as_ref().map(|_| this.predecessors_of(&node_id, &traverser)).unwrap_or_default();
                (node, predecessors, traverser.blueprint().id.clone())
            };
            let Some(node) = node else {
                return (node_id, Err(ActionError::Execution("node vanished from blueprint".into())));
            };

            this.state.lock().await.transition(node_id.clone(), NodeState::Running);
            this.emit(|execution_id| ExecutionEvent::NodeStart { execution_id, node_id: node_id.to_string() }).await;

            let scope = this.shared.to_json().await.unwrap_or(Value::Object(Default::default()));
            let scope_map = match scope {
                Value::Object(map) => map,
                _ => Default::default(),
            };
            let ctx = this.action_context(node_id.clone(), blueprint_id, Value::Null, this.clone()).await;
            let result = this
                .runtime
                .executor()
                .execute_node(&node, &predecessors, &scope_map, ctx)
                .await;
            drop(permit);
            (node_id, result)
        });
    }

    async fn handle_node_result(
        self: &Arc<Self>,
        node_id: NodeId,
        result: Result<StrategyResult, ActionError>,
    ) -> Result<(), EngineError> {
        match result {
            Ok(StrategyResult::Complete(output)) => {
                let action = output.action.clone();
                self.publish(&node_id, output.output.clone(), action.as_deref()).await?;
                self.traverser.lock().await.inject_dynamic(output.dynamic_nodes, output.dynamic_edges)?;
                Ok(())
            }
            Ok(StrategyResult::Suspend(reason)) => {
                self.state.lock().await.transition(node_id.clone(), NodeState::Awaiting);
                match reason {
                    flowcraft_action::SuspendReason::Sleep { after_millis } => {
                        self.runtime.scheduler().park_sleep(self.run_id, node_id, Duration::from_millis(after_millis));
                    }
                    flowcraft_action::SuspendReason::WaitForEvent { name } => {
                        self.runtime.scheduler().park(self.run_id, node_id, Awaiting::Event { name });
                    }
                    flowcraft_action::SuspendReason::WaitForWebhook { url, event } => {
                        self.runtime.scheduler().park(self.run_id, node_id, Awaiting::Webhook { url, event });
                    }
                }
                Ok(())
            }
            Err(err) => {
                self.state.lock().await.transition(node_id.clone(), NodeState::Failed);
                self.state.lock().await.record_error(node_id.clone(), err.to_string());
                self.emit(|execution_id| ExecutionEvent::NodeError {
                    execution_id,
                    node_id: node_id.to_string(),
                    error: err.to_string(),
                })
                .await;
                if self.options.strict || err.is_fatal() {
                    self.cancellation.cancel();
                }
                Ok(())
            }
        }
    }

    /// Write a completed (or resumed) node's output, apply the edge
    /// taxonomy, and splice any `_inputs.<target>` transform results.
    async fn publish(&self, node_id: &NodeId, output: Value, action: Option<&str>) -> Result<(), EngineError> {
        self.shared.set(&reserved::output_key(node_id.as_str()), output.clone()).await?;
        self.emit(|execution_id| ExecutionEvent::ContextChange {
            execution_id,
            source_node: Some(node_id.to_string()),
            key: reserved::output_key(node_id.as_str()),
        })
        .await;

        let mut traverser = self.traverser.lock().await;
        traverser.mark_completed(node_id.clone());
        self.state.lock().await.transition(node_id.clone(), NodeState::Completed);

        let mut strategy_output = flowcraft_action::StrategyOutput::new(output.clone());
        if let Some(action) = action {
            strategy_output = strategy_output.with_action(action);
        }
        let eval_scope = serde_json::json!({"result": output, "context": self.shared.to_json().await?});
        let evaluator = self.runtime.edge_evaluator();
        let edges: Vec<_> = traverser
            .determine_next_nodes(node_id, &strategy_output, evaluator, &eval_scope)
            .into_iter()
            .cloned()
            .collect();
        drop(traverser);

        for edge in &edges {
            apply_edge_transform(evaluator, edge, &output, self.shared.as_ref()).await?;
        }

        self.emit(|execution_id| ExecutionEvent::NodeFinish {
            execution_id,
            node_id: node_id.to_string(),
            duration: Duration::default(),
        })
        .await;
        Ok(())
    }

    async fn finish(&self, status: ExecutionStatus) -> Result<WorkflowResult, EngineError> {
        let context = self.shared.to_json().await?;
        let serialized_context = serde_json::to_string(&context).unwrap_or_default();
        let errors = self.state.lock().await.errors.iter().map(|(_, msg)| msg.clone()).collect();
        self.emit(|execution_id| ExecutionEvent::WorkflowFinish {
            execution_id,
            status: format!("{status:?}").to_lowercase(),
        })
        .await;
        Ok(WorkflowResult { context, serialized_context, status, errors })
    }
}

#[async_trait]
impl GraphCallback for Orchestrator {
    async fn run_node(&self, node_id: &NodeId, input: Value) -> Result<StrategyResult, ActionError> {
        let (node, blueprint_id) = {
            let traverser = self.traverser.lock().await;
            (traverser.blueprint().node(node_id).cloned(), traverser.blueprint().id.clone())
        };
        let node = node.ok_or_else(|| ActionError::Execution(format!("unknown node {node_id}")))?;
        let ctx = self
            .action_context(node_id.clone(), blueprint_id, input.clone(), Arc::new(NullGraph))
            .await;
        self.runtime.executor().execute_resolved(&node, input, ctx).await
    }

    async fn run_subflow(&self, blueprint: &Blueprint, input: Value) -> Result<Value, ActionError> {
        let options = self.options.clone();
        let outcome = self
            .runtime
            .run(blueprint.clone(), input, options)
            .await
            .map_err(|e| ActionError::Execution(e.to_string()))?;
        match outcome {
            crate::runtime::RunOutcome::Finished(result) if result.status == ExecutionStatus::Completed => {
                Ok(result.context)
            }
            crate::runtime::RunOutcome::Finished(result) => {
                Err(ActionError::Execution(format!("subflow ended with status {:?}", result.status)))
            }
            crate::runtime::RunOutcome::Awaiting { .. } => {
                Err(ActionError::Execution("subflow suspended on a wait strategy is not supported synchronously".into()))
            }
        }
    }
}

/// A [`GraphCallback`] that refuses every call, attached to nodes run via
/// [`Orchestrator::run_node`] so a re-entrant node cannot itself recurse
/// into `subflow`/`parallel-container` without an explicit parent run.
struct NullGraph;

#[async_trait]
impl GraphCallback for NullGraph {
    async fn run_node(&self, _node_id: &NodeId, _input: Value) -> Result<StrategyResult, ActionError> {
        Err(ActionError::Fatal("nested graph callbacks are not supported".into()))
    }

    async fn run_subflow(&self, _blueprint: &Blueprint, _input: Value) -> Result<Value, ActionError> {
        Err(ActionError::Fatal("nested graph callbacks are not supported".into()))
    }
}
