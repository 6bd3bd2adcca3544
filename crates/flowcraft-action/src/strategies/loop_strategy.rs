//! The `loop` strategy: re-enter a node while a condition holds or until
//! a maximum iteration count (`spec.md` §4.4 step 3).

use async_trait::async_trait;
use flowcraft_core::ids::NodeId;
use flowcraft_expression::Evaluator;
use serde_json::Value;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::{Strategy, UserFunctionRegistry};
use crate::result::StrategyResult;

const DEFAULT_MAX_ITERATIONS: u64 = 1000;

/// Repeatedly runs `params.startNodeId` via the attached [`crate::context::GraphCallback`],
/// feeding each iteration's output forward as the next iteration's input,
/// while `params.condition` evaluates truthy against `{result, loopData}`
/// and the iteration count stays under `params.maxIterations`.
///
/// `loopData.counter` is advanced by this strategy, per the spec's note
/// that the runtime — not the looped node itself — owns the counter.
pub struct LoopStrategy;

#[async_trait]
impl Strategy for LoopStrategy {
    async fn run(
        &self,
        ctx: &ActionContext,
        params: Option<&Value>,
        _functions: &UserFunctionRegistry,
    ) -> Result<StrategyResult, ActionError> {
        let start_node_id = params
            .and_then(|p| p.get("startNodeId"))
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::Execution("loop: params.startNodeId is required".into()))?;
        let condition = params.and_then(|p| p.get("condition")).and_then(Value::as_str);
        let max_iterations = params
            .and_then(|p| p.get("maxIterations"))
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);

        let graph = ctx.require_graph()?;
        // Loop conditions are comparison expressions ("result < 3"), which the
        // default safe-path evaluator cannot express; opt into the sandboxed one.
        let evaluator = Evaluator::sandboxed();
        let start_node = NodeId::new(start_node_id);

        let mut input = ctx.input.clone();
        let mut counter: u64 = 0;
        let mut last_output = Value::Null;

        loop {
            if ctx.is_cancelled() {
                return Err(ActionError::Cancelled);
            }
            if counter >= max_iterations {
                break;
            }

            let strategy_result = graph.run_node(&start_node, input.clone()).await?;
            let output = match strategy_result {
                StrategyResult::Complete(out) => out.output,
                StrategyResult::Suspend(reason) => return Ok(StrategyResult::Suspend(reason)),
            };
            counter += 1;
            last_output = output.clone();

            let should_continue = match condition {
                Some(expr) => {
                    let scope = serde_json::json!({
                        "result": output,
                        "loopData": {"counter": counter},
                    });
                    flowcraft_expression::truthy(&evaluator.evaluate(expr, &scope))
                }
                None => false,
            };
            if !should_continue {
                break;
            }
            input = output;
        }

        Ok(StrategyResult::success(serde_json::json!({
            "result": last_output,
            "loopData": {"counter": counter},
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use flowcraft_blueprint::Blueprint;
    use flowcraft_context::InMemoryAsyncContext;
    use flowcraft_core::ids::{BlueprintId, RunId};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::context::GraphCallback;

    struct CountingGraph(Arc<AtomicU64>);

    #[async_trait]
    impl GraphCallback for CountingGraph {
        async fn run_node(&self, _node_id: &NodeId, input: Value) -> Result<StrategyResult, ActionError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            let value = input.as_i64().unwrap_or(0) + 1;
            let _ = n;
            Ok(StrategyResult::success(Value::from(value)))
        }

        async fn run_subflow(&self, _blueprint: &Blueprint, _input: Value) -> Result<Value, ActionError> {
            unimplemented!("not exercised by loop strategy tests")
        }
    }

    fn test_context(input: Value, graph: Arc<dyn GraphCallback>) -> ActionContext {
        ActionContext {
            run_id: RunId::new(),
            blueprint_id: BlueprintId::new("bp"),
            node_id: NodeId::new("loop"),
            attempt: 1,
            input,
            shared: Arc::new(InMemoryAsyncContext::new()),
            cancellation: CancellationToken::new(),
            graph: Some(graph),
        }
    }

    #[tokio::test]
    async fn stops_when_condition_turns_falsy() {
        let calls = Arc::new(AtomicU64::new(0));
        let ctx = test_context(Value::from(0), Arc::new(CountingGraph(calls.clone())));
        let params = serde_json::json!({
            "startNodeId": "inc", "condition": "result < 3", "maxIterations": 100
        });
        let result = LoopStrategy.run(&ctx, Some(&params), &UserFunctionRegistry::new()).await.unwrap();
        match result {
            StrategyResult::Complete(out) => assert_eq!(out.output["loopData"]["counter"], Value::from(3)),
            StrategyResult::Suspend(_) => panic!("expected Complete"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_at_max_iterations_even_if_condition_holds() {
        let calls = Arc::new(AtomicU64::new(0));
        let ctx = test_context(Value::from(0), Arc::new(CountingGraph(calls.clone())));
        let params = serde_json::json!({"startNodeId": "inc", "condition": "true", "maxIterations": 2});
        LoopStrategy.run(&ctx, Some(&params), &UserFunctionRegistry::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn without_a_condition_runs_exactly_once() {
        let calls = Arc::new(AtomicU64::new(0));
        let ctx = test_context(Value::from(0), Arc::new(CountingGraph(calls.clone())));
        let params = serde_json::json!({"startNodeId": "inc"});
        LoopStrategy.run(&ctx, Some(&params), &UserFunctionRegistry::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
