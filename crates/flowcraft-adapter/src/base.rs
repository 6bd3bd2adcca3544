//! `BaseAdapter` (`spec.md` §4.7, §9): the queue-agnostic algorithms a
//! distributed Flowcraft deployment runs, parameterized by the small
//! [`CoordinationStore`]/[`QueueBinding`]/[`BlueprintStore`]/
//! [`ContextFactory`] ports rather than by subclassing a queue-specific
//! adapter ("compose via a `QueueBinding` interface", `spec.md` §9).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use flowcraft_action::context::ActionContext;
use flowcraft_action::result::{StrategyOutput, StrategyResult, SuspendReason};
use flowcraft_action::{ExecutionBudget, Middleware, Strategy, StrategyRegistry, UserFunctionRegistry};
use flowcraft_blueprint::{Blueprint, BlueprintAnalysis, JoinStrategy, NodeDefinition};
use flowcraft_context::AsyncContext;
use flowcraft_core::ids::{BlueprintId, NodeId, RunId};
use flowcraft_core::reserved;
use flowcraft_engine::runtime::apply_edge_transform;
use flowcraft_engine::scheduler::{Awaiting, Scheduler};
use flowcraft_engine::traverser::Traverser;
use flowcraft_expression::Evaluator;
use flowcraft_telemetry::{EventBus, ExecutionEvent};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::blueprints::BlueprintStore;
use crate::config::AdapterConfig;
use crate::context::ContextFactory;
use crate::error::AdapterError;
use crate::keys;
use crate::queue::{FinalResultEnvelope, FinalStatus, JobEnvelope, QueueBinding};
use crate::store::CoordinationStore;

/// Owns the effective strategy/function registries, middleware chain,
/// and budget shared across every job, plus the four ports a concrete
/// deployment plugs in.
pub struct BaseAdapter {
    coordination: Arc<dyn CoordinationStore>,
    queue: Arc<dyn QueueBinding>,
    blueprints: Arc<dyn BlueprintStore>,
    contexts: Arc<dyn ContextFactory>,
    executor: flowcraft_action::Executor,
    strategies: StrategyRegistry,
    edge_evaluator: Evaluator,
    events: Arc<EventBus>,
    scheduler: Arc<Scheduler>,
    config: AdapterConfig,
}

impl BaseAdapter {
    /// Build an adapter over the given ports, with the built-in strategy
    /// registry, no user functions or middleware, and the default budget.
    #[must_use]
    pub fn new(
        coordination: Arc<dyn CoordinationStore>,
        queue: Arc<dyn QueueBinding>,
        blueprints: Arc<dyn BlueprintStore>,
        contexts: Arc<dyn ContextFactory>,
    ) -> Self {
        let events = Arc::new(EventBus::new(256));
        let strategies = StrategyRegistry::with_builtins();
        let executor = flowcraft_action::Executor::new()
            .with_strategies(strategies.clone())
            .with_events(events.clone());
        Self {
            coordination,
            queue,
            blueprints,
            contexts,
            executor,
            strategies,
            edge_evaluator: Evaluator::sandboxed(),
            events,
            scheduler: Arc::new(Scheduler::new()),
            config: AdapterConfig::default(),
        }
    }

    /// Override the pill/lock TTLs, heartbeat cadence, and scheduler
    /// tick interval (`spec.md` §4.9, ambient defaults).
    #[must_use]
    pub fn with_config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Register or override a strategy in the effective registry.
    #[must_use]
    pub fn with_strategy(mut self, key: impl Into<String>, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.register(key, strategy);
        self.executor = self.executor.with_strategies(self.strategies.clone());
        self
    }

    /// Swap in a run-wide user function registry.
    #[must_use]
    pub fn with_functions(mut self, functions: UserFunctionRegistry) -> Self {
        self.executor = self.executor.with_functions(functions);
        self
    }

    /// Append a middleware to the executor's chain.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.executor = self.executor.with_middleware(middleware);
        self
    }

    /// Override the default resource budget.
    #[must_use]
    pub fn with_budget(mut self, budget: ExecutionBudget) -> Self {
        self.executor = self.executor.with_budget(budget);
        self
    }

    /// Swap in an externally-owned event bus.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.executor = self.executor.with_events(events.clone());
        self.events = events;
        self
    }

    /// The event bus jobs are published on (`job:enqueued`/`job:processed`/
    /// `job:failed`, plus the shared `workflow:*`/`node:*` vocabulary).
    #[must_use]
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Client-side run start (`spec.md` §4.7, steps 1-2 of "Client"):
    /// pick a fresh run id, seed the context with `initialContext ∪
    /// {blueprintId, blueprintVersion}`, and enqueue every start node.
    pub async fn start(&self, blueprint: &Blueprint, initial_context: Value) -> Result<RunId, AdapterError> {
        let run_id = RunId::new();
        let shared = self.contexts.context_for(run_id);

        if let Value::Object(fields) = &initial_context {
            for (key, value) in fields {
                shared.set(key, value.clone()).await?;
            }
        }
        shared.set(reserved::BLUEPRINT_ID, Value::from(blueprint.id.as_str())).await?;
        if let Some(version) = blueprint.version() {
            shared.set(reserved::BLUEPRINT_VERSION, Value::from(version.to_string())).await?;
        }
        self.coordination
            .set_if_not_exists(&keys::blueprint_fallback_key(run_id), blueprint.id.as_str(), self.config.pill_ttl)
            .await?;

        let analysis = BlueprintAnalysis::compute(blueprint)?;
        for start in &analysis.start_node_ids {
            shared.set(&reserved::input_key(start.as_str()), initial_context.clone()).await?;
            self.enqueue(run_id, blueprint.id.clone(), start.clone()).await?;
        }
        Ok(run_id)
    }

    /// The worker job handler (`spec.md` §4.7, "Worker (job handler)"):
    /// fetch and version-check the blueprint, execute exactly one node,
    /// and either finish the run or advance its frontier.
    pub async fn handle_job(&self, job: JobEnvelope) -> Result<(), AdapterError> {
        // Step 1: fetch blueprint by id.
        let Some(blueprint) = self.blueprints.get(&job.blueprint_id).await? else {
            self.queue.ack(&job).await?;
            self.publish_failure(job.run_id, format!("blueprint {} not found", job.blueprint_id)).await?;
            return Ok(());
        };
        let shared = self.contexts.context_for(job.run_id);

        // Step 2: version check against the run's pinned version.
        if let Some(pinned) = shared.get(reserved::BLUEPRINT_VERSION).await?.and_then(value_as_string) {
            let incoming = blueprint.version().map(ToString::to_string);
            if incoming.as_deref() != Some(pinned.as_str()) {
                self.queue.ack(&job).await?;
                return Err(AdapterError::VersionMismatch(job.blueprint_id.clone()));
            }
        }

        // Step 3: persist the pin if this is the first job seen for the run.
        if !shared.has(reserved::BLUEPRINT_ID).await? {
            shared.set(reserved::BLUEPRINT_ID, Value::from(job.blueprint_id.as_str())).await?;
            if let Some(version) = blueprint.version() {
                shared.set(reserved::BLUEPRINT_VERSION, Value::from(version.to_string())).await?;
            }
            self.coordination
                .set_if_not_exists(&keys::blueprint_fallback_key(job.run_id), job.blueprint_id.as_str(), self.config.pill_ttl)
                .await?;
        }

        let node = blueprint
            .node(&job.node_id)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownNode(job.node_id.clone()))?;

        // Defensive poison/cancel check: a predecessor may have failed (or
        // an `"any"`-join sibling may have won) after this job was already
        // sitting on the queue.
        if self.coordination.get(&keys::fanin_poison_key(job.run_id, &job.node_id)).await?.is_some() {
            self.fail_node_and_cascade(&blueprint, job.run_id, &job.node_id, "predecessor poisoned").await?;
            self.queue.ack(&job).await?;
            return Ok(());
        }
        if self.coordination.get(&keys::fanin_cancel_key(job.run_id, &job.node_id)).await?.is_some() {
            self.queue.ack(&job).await?;
            return Ok(());
        }

        // Step 4: heartbeat for the duration of execution.
        let heartbeat = self.spawn_heartbeat(job.run_id, job.node_id.clone());

        // Step 5: execute via the shared pipeline.
        let analysis = BlueprintAnalysis::compute(&blueprint)?;
        let predecessors: Vec<String> =
            analysis.predecessors_of(&job.node_id).iter().map(NodeId::to_string).collect();
        let scope = match shared.to_json().await? {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let ctx = ActionContext {
            run_id: job.run_id,
            blueprint_id: job.blueprint_id.clone(),
            node_id: job.node_id.clone(),
            attempt: 1,
            input: Value::Null,
            shared: shared.clone(),
            cancellation: CancellationToken::new(),
            // Nested subflow/loop/parallel-container re-entry has no
            // dispatch target in a stateless worker process.
            graph: None,
        };
        self.events.emit(ExecutionEvent::NodeStart {
            execution_id: job.run_id.to_string(),
            node_id: job.node_id.to_string(),
        });
        let result = self.executor.execute_node(&node, &predecessors, &scope, ctx).await;
        heartbeat.abort();

        let output = match result {
            Ok(StrategyResult::Complete(output)) => output,
            Ok(StrategyResult::Suspend(reason)) => {
                self.park(job.run_id, job.node_id.clone(), reason);
                self.queue.ack(&job).await?;
                return Ok(());
            }
            Err(err) => {
                let reason = err.to_string();
                self.events.emit(ExecutionEvent::JobFailed {
                    execution_id: job.run_id.to_string(),
                    node_id: job.node_id.to_string(),
                    reason: reason.clone(),
                });
                self.fail_node_and_cascade(&blueprint, job.run_id, &job.node_id, &reason).await?;
                self.queue.ack(&job).await?;
                return Ok(());
            }
        };

        self.advance(&blueprint, job.run_id, &job.node_id, &shared, output).await?;
        self.events.emit(ExecutionEvent::JobProcessed {
            execution_id: job.run_id.to_string(),
            node_id: job.node_id.to_string(),
        });
        self.queue.ack(&job).await?;
        Ok(())
    }

    /// Resume a node parked on `waitForEvent`/`waitForWebhook`, writing
    /// `payload` as its output and continuing exactly as `handle_job`
    /// would after a synchronous completion.
    pub async fn resume(
        &self,
        run_id: RunId,
        blueprint_id: BlueprintId,
        node_id: NodeId,
        payload: Value,
    ) -> Result<(), AdapterError> {
        let blueprint = self
            .blueprints
            .get(&blueprint_id)
            .await?
            .ok_or_else(|| AdapterError::UnknownBlueprint(blueprint_id))?;
        self.scheduler.take(run_id, &node_id);
        let shared = self.contexts.context_for(run_id);
        self.advance(&blueprint, run_id, &node_id, &shared, StrategyOutput::new(payload)).await
    }

    /// Inspect a run's persisted context, derive its completed set, and
    /// re-enqueue every ready-but-unscheduled node, skipping poisoned or
    /// cancelled ones (`spec.md` §4.7, "Reconciliation").
    pub async fn reconcile(&self, run_id: RunId, blueprint: &Blueprint) -> Result<Vec<NodeId>, AdapterError> {
        let shared = self.contexts.context_for(run_id);
        let analysis = BlueprintAnalysis::compute(blueprint)?;
        let context = shared.to_json().await?;
        let completed: HashSet<NodeId> = blueprint
            .nodes
            .iter()
            .map(|n| n.id.clone())
            .filter(|id| context.get(reserved::output_key(id.as_str())).is_some())
            .collect();

        let mut enqueued = Vec::new();
        for node in &blueprint.nodes {
            if completed.contains(&node.id) {
                continue;
            }
            if self.coordination.get(&keys::fanin_poison_key(run_id, &node.id)).await?.is_some() {
                continue;
            }
            if self.coordination.get(&keys::fanin_cancel_key(run_id, &node.id)).await?.is_some() {
                continue;
            }
            let ready = match node.join_strategy() {
                JoinStrategy::All => analysis.all_predecessors_completed(&node.id, &completed),
                JoinStrategy::Any => {
                    let preds = analysis.predecessors_of(&node.id);
                    preds.is_empty() || preds.iter().any(|p| completed.contains(p))
                }
            };
            if !ready {
                continue;
            }
            let acquired = match node.join_strategy() {
                JoinStrategy::Any => {
                    self.coordination
                        .set_if_not_exists(&keys::joinlock_key(run_id, &node.id), "1", self.config.pill_ttl)
                        .await?
                }
                JoinStrategy::All => {
                    self.coordination
                        .set_if_not_exists(&keys::nodelock_key(run_id, &node.id), "1", self.config.node_lock_ttl)
                        .await?
                }
            };
            if !acquired {
                continue;
            }
            self.enqueue(run_id, blueprint.id.clone(), node.id.clone()).await?;
            enqueued.push(node.id.clone());
        }
        Ok(enqueued)
    }

    /// Steps 6-8 of the job handler: write the node's output, check for
    /// run completion, then apply the edge taxonomy and fan-in
    /// arbitration to decide which successors to enqueue.
    async fn advance(
        &self,
        blueprint: &Blueprint,
        run_id: RunId,
        node_id: &NodeId,
        shared: &Arc<dyn AsyncContext>,
        output: StrategyOutput,
    ) -> Result<(), AdapterError> {
        shared.set(&reserved::output_key(node_id.as_str()), output.output.clone()).await?;

        let analysis = BlueprintAnalysis::compute(blueprint)?;
        if analysis.terminal_node_ids.contains(node_id) && self.all_terminal_outputs_present(&analysis, shared).await? {
            self.complete_run(run_id, shared).await?;
            return Ok(());
        }

        let eval_scope = serde_json::json!({"result": output.output, "context": shared.to_json().await?});
        let traverser = Traverser::new(blueprint.clone())?;
        let edges = traverser.determine_next_nodes(node_id, &output, &self.edge_evaluator, &eval_scope);

        for edge in edges {
            apply_edge_transform(&self.edge_evaluator, edge, &output.output, shared.as_ref()).await?;
            let successor = edge.target.clone();

            // Step 8: a poisoned successor must never be enqueued.
            if self.coordination.get(&keys::fanin_poison_key(run_id, &successor)).await?.is_some() {
                continue;
            }

            let pred_count = analysis.predecessors_of(&successor).len();
            let should_enqueue = if pred_count <= 1 {
                true
            } else {
                match blueprint.node(&successor).map(NodeDefinition::join_strategy).unwrap_or_default() {
                    JoinStrategy::All => {
                        let counter_key = keys::fanin_counter_key(run_id, &successor);
                        let reached = self.coordination.increment(&counter_key, self.config.pill_ttl).await?;
                        if reached as usize >= pred_count {
                            self.coordination.delete(&counter_key).await?;
                            true
                        } else {
                            false
                        }
                    }
                    JoinStrategy::Any => {
                        let acquired = self
                            .coordination
                            .set_if_not_exists(&keys::joinlock_key(run_id, &successor), "1", self.config.pill_ttl)
                            .await?;
                        if !acquired && self.coordination.get(&keys::fanin_cancel_key(run_id, &successor)).await?.is_some() {
                            self.publish_failure(run_id, format!("predecessor {node_id} lost an \"any\" join race that was cancelled")).await?;
                        }
                        acquired
                    }
                }
            };

            if should_enqueue {
                self.enqueue(run_id, blueprint.id.clone(), successor).await?;
            }
        }
        Ok(())
    }

    /// Step 9: publish the run's failure and write a poison pill (for
    /// `"all"`-join successors) or a cancellation pill (for `"any"`-join
    /// successors) to every direct successor of the failed node.
    async fn fail_node_and_cascade(
        &self,
        blueprint: &Blueprint,
        run_id: RunId,
        node_id: &NodeId,
        reason: &str,
    ) -> Result<(), AdapterError> {
        let analysis = BlueprintAnalysis::compute(blueprint)?;
        for successor in analysis.successors_of(node_id) {
            match blueprint.node(successor).map(NodeDefinition::join_strategy).unwrap_or_default() {
                JoinStrategy::All => {
                    self.coordination
                        .set_if_not_exists(&keys::fanin_poison_key(run_id, successor), "1", self.config.pill_ttl)
                        .await?;
                }
                JoinStrategy::Any => {
                    self.coordination
                        .set_if_not_exists(&keys::fanin_cancel_key(run_id, successor), "1", self.config.pill_ttl)
                        .await?;
                }
            }
        }
        self.publish_failure(run_id, reason.to_owned()).await
    }

    async fn all_terminal_outputs_present(
        &self,
        analysis: &BlueprintAnalysis,
        shared: &Arc<dyn AsyncContext>,
    ) -> Result<bool, AdapterError> {
        for id in &analysis.terminal_node_ids {
            if !shared.has(&reserved::output_key(id.as_str())).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn complete_run(&self, run_id: RunId, shared: &Arc<dyn AsyncContext>) -> Result<(), AdapterError> {
        let context = shared.to_json().await?;
        let serialized_context = serde_json::to_string(&context).unwrap_or_default();
        self.events.emit(ExecutionEvent::WorkflowFinish {
            execution_id: run_id.to_string(),
            status: "completed".into(),
        });
        self.queue
            .publish_final_result(
                run_id,
                FinalResultEnvelope {
                    status: FinalStatus::Completed,
                    payload: serde_json::json!({
                        "context": context,
                        "serializedContext": serialized_context,
                        "status": "completed",
                    }),
                    reason: None,
                },
            )
            .await
    }

    async fn publish_failure(&self, run_id: RunId, reason: String) -> Result<(), AdapterError> {
        let shared = self.contexts.context_for(run_id);
        let context = shared.to_json().await.unwrap_or(Value::Null);
        let serialized_context = serde_json::to_string(&context).unwrap_or_default();
        self.events.emit(ExecutionEvent::WorkflowFinish { execution_id: run_id.to_string(), status: "failed".into() });
        self.queue
            .publish_final_result(
                run_id,
                FinalResultEnvelope {
                    status: FinalStatus::Failed,
                    payload: serde_json::json!({
                        "context": context,
                        "serializedContext": serialized_context,
                        "status": "failed",
                    }),
                    reason: Some(reason),
                },
            )
            .await
    }

    async fn enqueue(&self, run_id: RunId, blueprint_id: BlueprintId, node_id: NodeId) -> Result<(), AdapterError> {
        self.events.emit(ExecutionEvent::JobEnqueued { execution_id: run_id.to_string(), node_id: node_id.to_string() });
        self.queue.enqueue(JobEnvelope::new(run_id, blueprint_id, node_id)).await
    }

    fn park(&self, run_id: RunId, node_id: NodeId, reason: SuspendReason) {
        match reason {
            SuspendReason::Sleep { after_millis } => {
                self.scheduler.park_sleep(run_id, node_id, Duration::from_millis(after_millis));
            }
            SuspendReason::WaitForEvent { name } => {
                self.scheduler.park(run_id, node_id, Awaiting::Event { name });
            }
            SuspendReason::WaitForWebhook { url, event } => {
                self.scheduler.park(run_id, node_id, Awaiting::Webhook { url, event });
            }
        }
    }

    /// Extend the TTL of every pill/counter key this node could be
    /// holding for as long as it stays in flight (`spec.md` §4.7 step 4).
    fn spawn_heartbeat(&self, run_id: RunId, node_id: NodeId) -> tokio::task::JoinHandle<()> {
        let coordination = self.coordination.clone();
        let heartbeat_interval = self.config.heartbeat_interval;
        let pill_ttl = self.config.pill_ttl;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(heartbeat_interval).await;
                let _ = coordination.extend_ttl(&keys::fanin_poison_key(run_id, &node_id), pill_ttl).await;
                let _ = coordination.extend_ttl(&keys::fanin_cancel_key(run_id, &node_id), pill_ttl).await;
                let _ = coordination.extend_ttl(&keys::joinlock_key(run_id, &node_id), pill_ttl).await;
                let _ = coordination.extend_ttl(&keys::fanin_counter_key(run_id, &node_id), pill_ttl).await;
            }
        })
    }

    /// Spawn the deployment-wide ticker that scans the in-process
    /// [`Scheduler`] for sleeps that have come due and resumes them
    /// exactly as an external `resume()` call would (`spec.md` §4.8).
    /// One deployment runs exactly one of these regardless of worker
    /// count, since the scheduler's sleep index is itself process-local.
    #[must_use]
    pub fn spawn_scheduler_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let adapter = self.clone();
        let tick_interval = self.config.scheduler_tick_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick_interval).await;
                for (run_id, node_id) in adapter.scheduler.tick() {
                    if let Err(err) = adapter.resume_due_sleep(run_id, node_id.clone()).await {
                        tracing::warn!(%run_id, %node_id, %err, "scheduler tick: failed to resume a due sleep");
                    }
                }
            }
        })
    }

    async fn resume_due_sleep(&self, run_id: RunId, node_id: NodeId) -> Result<(), AdapterError> {
        let Some(blueprint_id) = self.coordination.get(&keys::blueprint_fallback_key(run_id)).await? else {
            return Ok(());
        };
        self.resume(run_id, BlueprintId::from(blueprint_id), node_id, Value::Null).await
    }
}

fn value_as_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprints::InMemoryBlueprintStore;
    use crate::context::InMemoryContextFactory;
    use crate::queue::InMemoryQueueBinding;
    use crate::store::InMemoryCoordinationStore;
    use flowcraft_blueprint::{EdgeDefinition, NodeConfig};

    fn adapter() -> (Arc<BaseAdapter>, Arc<InMemoryQueueBinding>, Arc<InMemoryBlueprintStore>) {
        let coordination = Arc::new(InMemoryCoordinationStore::new());
        let queue = Arc::new(InMemoryQueueBinding::new());
        let blueprints = Arc::new(InMemoryBlueprintStore::new());
        let contexts = Arc::new(InMemoryContextFactory::new());
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("echo", |v: Value| async move { Ok(v) });
        let adapter = Arc::new(
            BaseAdapter::new(coordination, queue.clone(), blueprints.clone(), contexts).with_functions(functions),
        );
        (adapter, queue, blueprints)
    }

    fn function_node(id: &str) -> NodeDefinition {
        let mut node = NodeDefinition::new(id, "function");
        node.params = Some(serde_json::json!({"function": "echo"}));
        node
    }

    async fn drain(adapter: &BaseAdapter, queue: &InMemoryQueueBinding) {
        while let Some(job) = queue.dequeue().await.unwrap() {
            adapter.handle_job(job).await.unwrap();
        }
    }

    #[tokio::test]
    async fn a_linear_run_completes_end_to_end() {
        let (adapter, queue, blueprints) = adapter();
        let bp = Blueprint::new("bp")
            .with_node(function_node("a"))
            .with_node(function_node("b"))
            .with_edge(EdgeDefinition::new("a", "b"));
        blueprints.insert(bp.clone());

        let run_id = adapter.start(&bp, serde_json::json!(1)).await.unwrap();
        drain(&adapter, &queue).await;

        let published = queue.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, run_id);
        assert_eq!(published[0].1.status, FinalStatus::Completed);
    }

    #[tokio::test]
    async fn an_all_join_waits_for_both_predecessors() {
        let (adapter, queue, blueprints) = adapter();
        let bp = Blueprint::new("bp")
            .with_node(function_node("a"))
            .with_node(function_node("b"))
            .with_node(function_node("c"))
            .with_edge(EdgeDefinition::new("a", "c"))
            .with_edge(EdgeDefinition::new("b", "c"));
        blueprints.insert(bp.clone());

        adapter.start(&bp, Value::Null).await.unwrap();
        // Only "a" and "b" are start nodes; handle exactly those first.
        let job_a = queue.dequeue().await.unwrap().unwrap();
        let job_b = queue.dequeue().await.unwrap().unwrap();
        assert!(queue.dequeue().await.unwrap().is_none());

        adapter.handle_job(job_a).await.unwrap();
        // "c" must not be enqueued after only one predecessor lands.
        assert!(queue.is_empty());

        adapter.handle_job(job_b).await.unwrap();
        let job_c = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job_c.node_id, NodeId::from("c"));
    }

    #[tokio::test]
    async fn an_any_join_enqueues_once_and_cancels_the_loser() {
        let (adapter, queue, blueprints) = adapter();
        let mut c = function_node("c");
        c.config = Some(NodeConfig { join_strategy: JoinStrategy::Any, ..Default::default() });
        let bp = Blueprint::new("bp")
            .with_node(function_node("a"))
            .with_node(function_node("b"))
            .with_node(c)
            .with_edge(EdgeDefinition::new("a", "c"))
            .with_edge(EdgeDefinition::new("b", "c"));
        blueprints.insert(bp.clone());

        adapter.start(&bp, Value::Null).await.unwrap();
        let job_a = queue.dequeue().await.unwrap().unwrap();
        let job_b = queue.dequeue().await.unwrap().unwrap();

        adapter.handle_job(job_a).await.unwrap();
        let job_c = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job_c.node_id, NodeId::from("c"));

        // "b" lands after "c" already won the race: no second enqueue.
        adapter.handle_job(job_b).await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn an_any_join_loser_fails_the_run_if_the_race_was_already_cancelled() {
        let coordination = Arc::new(InMemoryCoordinationStore::new());
        let queue = Arc::new(InMemoryQueueBinding::new());
        let blueprints = Arc::new(InMemoryBlueprintStore::new());
        let contexts = Arc::new(InMemoryContextFactory::new());
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("echo", |v: Value| async move { Ok(v) });
        let adapter = BaseAdapter::new(coordination.clone(), queue.clone(), blueprints.clone(), contexts)
            .with_functions(functions);

        let mut c = function_node("c");
        c.config = Some(NodeConfig { join_strategy: JoinStrategy::Any, ..Default::default() });
        let bp = Blueprint::new("bp")
            .with_node(function_node("a"))
            .with_node(function_node("b"))
            .with_node(c)
            .with_edge(EdgeDefinition::new("a", "c"))
            .with_edge(EdgeDefinition::new("b", "c"));
        blueprints.insert(bp.clone());

        let run_id = adapter.start(&bp, Value::Null).await.unwrap();
        let job_a = queue.dequeue().await.unwrap().unwrap();
        let job_b = queue.dequeue().await.unwrap().unwrap();

        adapter.handle_job(job_a).await.unwrap();
        let job_c = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job_c.node_id, NodeId::from("c"));

        // Some other predecessor of "c" failed fatally elsewhere and
        // cascaded a cancellation pill, even though "a" already won the
        // join-lock race for "c".
        coordination
            .set_if_not_exists(&keys::fanin_cancel_key(run_id, &NodeId::from("c")), "1", Duration::from_secs(60))
            .await
            .unwrap();

        // "b" loses the race (the lock is already held); it must see the
        // cancellation pill and fail the run rather than silently no-op.
        adapter.handle_job(job_b).await.unwrap();
        let published = queue.published();
        assert_eq!(published.last().unwrap().1.status, FinalStatus::Failed);
    }

    #[tokio::test]
    async fn a_fatal_node_failure_poisons_its_all_join_successor() {
        let coordination = Arc::new(InMemoryCoordinationStore::new());
        let queue = Arc::new(InMemoryQueueBinding::new());
        let blueprints = Arc::new(InMemoryBlueprintStore::new());
        let contexts = Arc::new(InMemoryContextFactory::new());
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("echo", |v: Value| async move { Ok(v) });
        let adapter = BaseAdapter::new(coordination.clone(), queue.clone(), blueprints.clone(), contexts)
            .with_functions(functions);

        let mut failing = NodeDefinition::new("a", "function");
        failing.params = Some(serde_json::json!({"function": "missing"}));
        let bp = Blueprint::new("bp")
            .with_node(failing)
            .with_node(function_node("b"))
            .with_node(function_node("c"))
            .with_edge(EdgeDefinition::new("a", "c"))
            .with_edge(EdgeDefinition::new("b", "c"));
        blueprints.insert(bp.clone());

        adapter.start(&bp, Value::Null).await.unwrap();
        let job_a = queue.dequeue().await.unwrap().unwrap();
        let job_b = queue.dequeue().await.unwrap().unwrap();

        adapter.handle_job(job_a).await.unwrap();
        let published = queue.published();
        assert_eq!(published.last().unwrap().1.status, FinalStatus::Failed);

        // "b" still completes, but "c" must never enqueue: it is poisoned.
        adapter.handle_job(job_b).await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn the_scheduler_ticker_resumes_a_due_sleep_without_a_manual_resume_call() {
        let coordination = Arc::new(InMemoryCoordinationStore::new());
        let queue = Arc::new(InMemoryQueueBinding::new());
        let blueprints = Arc::new(InMemoryBlueprintStore::new());
        let contexts = Arc::new(InMemoryContextFactory::new());
        let mut sleep_node = NodeDefinition::new("a", "wait");
        sleep_node.params = Some(serde_json::json!({"sleepMillis": 1}));
        let bp = Blueprint::new("bp").with_node(sleep_node).with_node(function_node("b")).with_edge(EdgeDefinition::new("a", "b"));
        blueprints.insert(bp.clone());

        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("echo", |v: Value| async move { Ok(v) });
        let adapter = Arc::new(
            BaseAdapter::new(coordination, queue.clone(), blueprints, contexts)
                .with_functions(functions)
                .with_config(AdapterConfig { scheduler_tick_interval: Duration::from_millis(5), ..Default::default() }),
        );
        let ticker = adapter.spawn_scheduler_ticker();

        let run_id = adapter.start(&bp, Value::Null).await.unwrap();
        let job_a = queue.dequeue().await.unwrap().unwrap();
        adapter.handle_job(job_a).await.unwrap();
        assert!(queue.is_empty(), "node a is parked, not re-enqueued yet");

        let job_b = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(job) = queue.dequeue().await.unwrap() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("ticker should have resumed the sleeping node");
        assert_eq!(job_b.node_id, NodeId::from("b"));
        assert_eq!(job_b.run_id, run_id);
        ticker.abort();
    }

    #[tokio::test]
    async fn reconcile_recomputes_and_re_enqueues_the_frontier() {
        let (adapter, queue, blueprints) = adapter();
        let bp = Blueprint::new("bp")
            .with_node(function_node("a"))
            .with_node(function_node("b"))
            .with_edge(EdgeDefinition::new("a", "b"));
        blueprints.insert(bp.clone());

        let run_id = adapter.start(&bp, Value::Null).await.unwrap();
        let job_a = queue.dequeue().await.unwrap().unwrap();
        adapter.handle_job(job_a).await.unwrap();
        // Drain "b"'s natural enqueue so reconcile starts from an empty queue.
        queue.dequeue().await.unwrap();

        let enqueued = adapter.reconcile(run_id, &bp).await.unwrap();
        assert_eq!(enqueued, vec![NodeId::from("b")]);
        let job = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job.node_id, NodeId::from("b"));
    }
}
