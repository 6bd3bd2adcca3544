//! The six-step per-node pipeline: resolve input, run the middleware
//! chain around strategy dispatch, retry/timeout, fallback, and publish
//! (`spec.md` §4.4).

use std::sync::Arc;
use std::time::{Duration, Instant};

use flowcraft_blueprint::NodeDefinition;
use flowcraft_core::error::Classify;
use flowcraft_telemetry::{EventBus, ExecutionEvent};
use rand::Rng;
use serde_json::Value;

use crate::budget::ExecutionBudget;
use crate::context::ActionContext;
use crate::error::ActionError;
use crate::input::ContextLookup;
use crate::middleware::{run_chain, Middleware};
use crate::registry::{StrategyRegistry, UserFunctionRegistry};
use crate::result::{StrategyOutput, StrategyResult};

const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(100);
const RETRY_BACKOFF_FACTOR: u32 = 2;

/// Executes a single node: resolves its input, runs it through the
/// middleware chain and strategy dispatch, applies retry/timeout/fallback,
/// and emits the corresponding lifecycle events.
pub struct Executor {
    strategies: StrategyRegistry,
    functions: UserFunctionRegistry,
    middleware: Vec<Arc<dyn Middleware>>,
    budget: ExecutionBudget,
    events: Option<Arc<EventBus>>,
}

impl Executor {
    /// Build an executor with the built-in strategy registry and no
    /// middleware, functions, or telemetry attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: StrategyRegistry::with_builtins(),
            functions: UserFunctionRegistry::new(),
            middleware: Vec::new(),
            budget: ExecutionBudget::default(),
            events: None,
        }
    }

    /// Swap in a different (or pre-composed) strategy registry.
    #[must_use]
    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    /// Swap in a different user-function registry.
    #[must_use]
    pub fn with_functions(mut self, functions: UserFunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Append a middleware to the chain, outermost-registered-first.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Override the default resource budget.
    #[must_use]
    pub fn with_budget(mut self, budget: ExecutionBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Attach an event bus for `node:*` lifecycle events.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    /// Run `node` once to completion (or suspension), resolving its input
    /// against `scope` (the run's flattened context snapshot) and
    /// `predecessors` (its direct predecessor ids), per `spec.md` §4.4.
    pub async fn execute_node(
        &self,
        node: &NodeDefinition,
        predecessors: &[String],
        scope: &dyn ContextLookup,
        base_ctx: ActionContext,
    ) -> Result<StrategyResult, ActionError> {
        let input = crate::input::resolve_input(node, predecessors, scope);
        self.execute_resolved(node, input, base_ctx).await
    }

    /// Run `node` once to completion (or suspension) with an already
    /// resolved `input`, skipping step 1 of `spec.md` §4.4. Used by the
    /// orchestrator's [`crate::context::GraphCallback`] re-entry points
    /// (`loop`, `parallel-container`), where the caller already knows
    /// exactly what input the re-entered node should see.
    pub async fn execute_resolved(
        &self,
        node: &NodeDefinition,
        input: Value,
        base_ctx: ActionContext,
    ) -> Result<StrategyResult, ActionError> {
        let max_retries = node.max_retries();
        let timeout = node.config.as_ref().and_then(|c| c.timeout);
        let fallback = node.config.as_ref().and_then(|c| c.fallback.clone());

        self.emit(ExecutionEvent::NodeStart {
            execution_id: base_ctx.run_id.to_string(),
            node_id: base_ctx.node_id.to_string(),
        });
        let started = Instant::now();

        let mut attempt: u32 = 1;
        loop {
            if base_ctx.is_cancelled() {
                return Err(ActionError::Cancelled);
            }

            let ctx = ActionContext { attempt, input: input.clone(), ..base_ctx.clone() };
            let node_params = node.params.clone();
            let result = self.dispatch(node, ctx, node_params, timeout).await;

            match result {
                Ok(strategy_result) => {
                    self.check_output_budget(&strategy_result)?;
                    self.emit(ExecutionEvent::NodeFinish {
                        execution_id: base_ctx.run_id.to_string(),
                        node_id: base_ctx.node_id.to_string(),
                        duration: started.elapsed(),
                    });
                    return Ok(strategy_result);
                }
                Err(err) if err.is_fatal() => {
                    self.emit(ExecutionEvent::NodeError {
                        execution_id: base_ctx.run_id.to_string(),
                        node_id: base_ctx.node_id.to_string(),
                        error: err.to_string(),
                    });
                    return Err(err);
                }
                Err(err) if attempt <= max_retries => {
                    attempt += 1;
                    self.emit(ExecutionEvent::NodeRetry {
                        execution_id: base_ctx.run_id.to_string(),
                        node_id: base_ctx.node_id.to_string(),
                        attempt,
                    });
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(err) => {
                    if let Some(name) = &fallback {
                        let output = self.functions.call(name, input.clone()).await;
                        return match output {
                            Ok(value) => {
                                self.emit(ExecutionEvent::NodeFallback {
                                    execution_id: base_ctx.run_id.to_string(),
                                    node_id: base_ctx.node_id.to_string(),
                                });
                                let output = StrategyOutput { fallback_used: true, ..StrategyOutput::new(value) };
                                self.emit(ExecutionEvent::NodeFinish {
                                    execution_id: base_ctx.run_id.to_string(),
                                    node_id: base_ctx.node_id.to_string(),
                                    duration: started.elapsed(),
                                });
                                Ok(StrategyResult::Complete(output))
                            }
                            Err(fallback_err) => {
                                self.emit(ExecutionEvent::NodeError {
                                    execution_id: base_ctx.run_id.to_string(),
                                    node_id: base_ctx.node_id.to_string(),
                                    error: fallback_err.to_string(),
                                });
                                Err(fallback_err)
                            }
                        };
                    }
                    self.emit(ExecutionEvent::NodeError {
                        execution_id: base_ctx.run_id.to_string(),
                        node_id: base_ctx.node_id.to_string(),
                        error: err.to_string(),
                    });
                    return Err(err);
                }
            }
        }
    }

    async fn dispatch(
        &self,
        node: &NodeDefinition,
        ctx: ActionContext,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<StrategyResult, ActionError> {
        let strategy = self
            .strategies
            .get(&node.uses)
            .cloned()
            .ok_or_else(|| ActionError::UnknownStrategy(node.uses.clone()))?;
        let functions = self.functions.clone();
        let dispatch = move |ctx: ActionContext| -> futures::future::BoxFuture<'static, Result<StrategyResult, ActionError>> {
            let strategy = strategy.clone();
            let params = params.clone();
            let functions = functions.clone();
            Box::pin(async move { strategy.run(&ctx, params.as_ref(), &functions).await })
        };

        let chained = run_chain(&self.middleware, ctx, &dispatch);
        match timeout {
            Some(duration) => match tokio::time::timeout(duration, chained).await {
                Ok(result) => result,
                Err(_) => Err(ActionError::Timeout),
            },
            None => chained.await,
        }
    }

    fn check_output_budget(&self, result: &StrategyResult) -> Result<(), ActionError> {
        if let StrategyResult::Complete(out) = result {
            if let Err((limit, actual)) = self.budget.check_output_size(&out.output) {
                return Err(ActionError::Execution(format!(
                    "node output of {actual} bytes exceeds the {limit} byte limit"
                )));
            }
        }
        Ok(())
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential retry backoff with full jitter: a uniformly random delay
/// between zero and `base * factor.pow(attempt - 1)`, matching `spec.md`
/// §4.4 step 4's documented baseline (base=100ms, factor=2) while
/// avoiding synchronized retry storms across concurrently retrying nodes.
fn backoff_delay(attempt: u32) -> Duration {
    let ceiling = RETRY_BACKOFF_BASE.saturating_mul(RETRY_BACKOFF_FACTOR.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_nanos(rand::rng().random_range(0..=ceiling.as_nanos() as u64))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use flowcraft_context::InMemoryAsyncContext;
    use flowcraft_core::ids::{BlueprintId, NodeId, RunId};
    use flowcraft_blueprint::{NodeConfig, NodeDefinition};
    use serde_json::Map;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn base_context(node_id: &str) -> ActionContext {
        ActionContext {
            run_id: RunId::new(),
            blueprint_id: BlueprintId::new("bp"),
            node_id: NodeId::new(node_id),
            attempt: 1,
            input: Value::Null,
            shared: Arc::new(InMemoryAsyncContext::new()),
            cancellation: CancellationToken::new(),
            graph: None,
        }
    }

    #[tokio::test]
    async fn a_successful_function_node_completes_on_the_first_attempt() {
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("echo", |v: Value| async move { Ok(v) });
        let executor = Executor::new().with_functions(functions);
        let node = NodeDefinition::new("n1", "function");
        let scope: Map<String, Value> = Map::new();
        let result = executor.execute_node(&node, &[], &scope, base_context("n1")).await.unwrap();
        match result {
            StrategyResult::Complete(out) => assert_eq!(out.output, Value::Null),
            StrategyResult::Suspend(_) => panic!("expected Complete"),
        }
    }

    #[tokio::test]
    async fn retries_up_to_max_retries_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("flaky", move |_: Value| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ActionError::Execution("not yet".into()))
                } else {
                    Ok(Value::from("ok"))
                }
            }
        });
        let executor = Executor::new().with_functions(functions);
        let mut node = NodeDefinition::new("flaky", "function");
        node.config = Some(NodeConfig { max_retries: Some(3), ..Default::default() });
        let scope: Map<String, Value> = Map::new();
        let result = executor.execute_node(&node, &[], &scope, base_context("flaky")).await.unwrap();
        match result {
            StrategyResult::Complete(out) => assert_eq!(out.output, Value::from("ok")),
            StrategyResult::Suspend(_) => panic!("expected Complete"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_when_configured() {
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("always_fails", |_: Value| async {
            Err(ActionError::Execution("boom".into()))
        });
        functions.register_fn("fb", |_: Value| async { Ok(Value::from("fallback")) });
        let executor = Executor::new().with_functions(functions);
        let mut node = NodeDefinition::new("always_fails", "function");
        node.config = Some(NodeConfig { max_retries: Some(0), fallback: Some("fb".into()), ..Default::default() });
        let scope: Map<String, Value> = Map::new();
        let result = executor.execute_node(&node, &[], &scope, base_context("always_fails")).await.unwrap();
        match result {
            StrategyResult::Complete(out) => {
                assert_eq!(out.output, Value::from("fallback"));
                assert!(out.fallback_used);
            }
            StrategyResult::Suspend(_) => panic!("expected Complete"),
        }
    }

    #[tokio::test]
    async fn unknown_strategy_key_surfaces_immediately() {
        let executor = Executor::new();
        let node = NodeDefinition::new("n1", "not-a-real-strategy");
        let scope: Map<String, Value> = Map::new();
        let err = executor.execute_node(&node, &[], &scope, base_context()).await.unwrap_err();
        assert!(matches!(err, ActionError::UnknownStrategy(_)));
    }

    #[tokio::test]
    async fn timeout_expires_before_a_slow_function_finishes() {
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("slow", |_: Value| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Value::Null)
        });
        let executor = Executor::new().with_functions(functions);
        let mut node = NodeDefinition::new("slow", "function");
        node.config = Some(NodeConfig { timeout: Some(Duration::from_millis(1)), ..Default::default() });
        let scope: Map<String, Value> = Map::new();
        let err = executor.execute_node(&node, &[], &scope, base_context()).await.unwrap_err();
        assert!(matches!(err, ActionError::Timeout));
    }

    #[test]
    fn backoff_stays_within_the_documented_exponential_ceiling() {
        for attempt in 1..=5 {
            let ceiling = Duration::from_millis(100) * 2u32.pow(attempt - 1);
            let delay = backoff_delay(attempt);
            assert!(delay <= ceiling, "attempt {attempt}: {delay:?} exceeds ceiling {ceiling:?}");
        }
    }
}
