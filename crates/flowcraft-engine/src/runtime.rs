//! The `Runtime` façade (`spec.md` §4.6): `run`/`resume`, the effective
//! registry composition, and the `applyEdgeTransform` primitive.

use std::collections::HashMap;
use std::sync::Arc;

use flowcraft_action::{
    ActionError, Executor, ExecutionBudget, Middleware, Strategy, StrategyRegistry,
    UserFunctionRegistry,
};
use flowcraft_blueprint::{Blueprint, EdgeDefinition};
use flowcraft_context::AsyncContext;
use flowcraft_core::ids::{NodeId, RunId};
use flowcraft_core::reserved;
use flowcraft_expression::Evaluator;
use flowcraft_telemetry::EventBus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::orchestrator::{Boundary, Orchestrator};
use crate::scheduler::Scheduler;
use crate::state::WorkflowResult;

/// Tunables for a single `run()` call (`SPEC_FULL.md` §4.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Maximum number of nodes scheduled at once. `None` is unbounded,
    /// the spec's documented default.
    pub concurrency: Option<usize>,
    /// When `true`, any node error (not only a fatal one) cancels the
    /// whole run immediately rather than letting independent branches
    /// continue (`spec.md` §7, "propagation policy").
    pub strict: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { concurrency: None, strict: false }
    }
}

/// What `run`/`resume` returned: either the run reached a terminal
/// status, or it is parked on a `waitForEvent`/`waitForWebhook`
/// suspension and must be resumed explicitly.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run reached `completed`, `failed`, `cancelled`, or `stalled`.
    Finished(WorkflowResult),
    /// The run emptied its frontier with only external suspensions
    /// pending; call [`Runtime::resume`] to continue it.
    Awaiting {
        /// The run's id, to pass back into `resume`.
        run_id: RunId,
    },
}

/// Owns the effective strategy/function registries, middleware chain,
/// budget, event bus, and scheduler shared across every run, and drives
/// each run's [`Orchestrator`] to a terminal or awaiting state.
pub struct Runtime {
    executor: Executor,
    strategies: StrategyRegistry,
    events: Arc<EventBus>,
    scheduler: Arc<Scheduler>,
    edge_evaluator: Evaluator,
    awaiting_runs: Mutex<HashMap<RunId, Arc<Orchestrator>>>,
}

impl Runtime {
    /// A runtime with the built-in strategy registry, no user functions
    /// or middleware, and the default budget.
    #[must_use]
    pub fn new() -> Self {
        let events = Arc::new(EventBus::new(256));
        let strategies = StrategyRegistry::with_builtins();
        let executor = Executor::new().with_strategies(strategies.clone()).with_events(events.clone());
        Self {
            executor,
            strategies,
            events,
            scheduler: Arc::new(Scheduler::new()),
            // Edge conditions are comparison expressions the safe-path
            // grammar cannot express (`spec.md` §9, Open Questions).
            edge_evaluator: Evaluator::sandboxed(),
            awaiting_runs: Mutex::new(HashMap::new()),
        }
    }

    /// Register or override a strategy in the effective registry
    /// (`spec.md` §4.6, "effective registry = builtin ⊕ user ⊕ blueprint-local").
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

    /// Swap in an externally-owned event bus, e.g. to share subscribers
    /// across several runtimes.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.executor = self.executor.with_events(events.clone());
        self.events = events;
        self
    }

    pub(crate) fn executor(&self) -> &Executor {
        &self.executor
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub(crate) fn edge_evaluator(&self) -> &Evaluator {
        &self.edge_evaluator
    }

    /// Run `blueprint` from `initial_context` to a terminal status or an
    /// external suspension (`spec.md` §4.6).
    pub async fn run(
        self: &Arc<Self>,
        blueprint: Blueprint,
        initial_context: Value,
        options: RuntimeOptions,
    ) -> Result<RunOutcome, EngineError> {
        let orchestrator = Arc::new(Orchestrator::new(self.clone(), blueprint, initial_context, options)?);
        self.drive(orchestrator).await
    }

    /// Resume a run parked on `node_id`, writing `payload` as that node's
    /// output and continuing traversal from there (`spec.md` §4.8: "the
    /// node's output is set only when `resume` supplies a value").
    pub async fn resume(
        self: &Arc<Self>,
        run_id: RunId,
        node_id: NodeId,
        payload: Value,
    ) -> Result<RunOutcome, EngineError> {
        let orchestrator = self
            .awaiting_runs
            .lock()
            .remove(&run_id)
            .ok_or_else(|| EngineError::Stalled(node_id.clone()))?;
        orchestrator.resolve_awaiting(&node_id, payload).await?;
        self.drive(orchestrator).await
    }

    async fn drive(self: &Arc<Self>, orchestrator: Arc<Orchestrator>) -> Result<RunOutcome, EngineError> {
        match orchestrator.clone().run_to_boundary().await? {
            Boundary::Finished(result) => {
                self.awaiting_runs.lock().remove(&orchestrator.run_id());
                Ok(RunOutcome::Finished(result))
            }
            Boundary::Awaiting => {
                let run_id = orchestrator.run_id();
                self.awaiting_runs.lock().insert(run_id, orchestrator);
                Ok(RunOutcome::Awaiting { run_id })
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// The fourth primitive of `spec.md` §4.6: write a target node's
/// `_inputs.<id>` entry from `edge.transform` (evaluated against
/// `{result, context}`), or the predecessor's raw output when the edge
/// carries no transform.
pub async fn apply_edge_transform(
    evaluator: &Evaluator,
    edge: &EdgeDefinition,
    output: &Value,
    shared: &dyn AsyncContext,
) -> Result<(), EngineError> {
    let transformed = match &edge.transform {
        Some(expr) => {
            let scope = serde_json::json!({"result": output, "context": shared.to_json().await?});
            evaluator.evaluate(expr, &scope)
        }
        None => output.clone(),
    };
    shared.set(&reserved::input_key(edge.target.as_str()), transformed).await?;
    Ok(())
}
