//! The `parallel-container` strategy: fan out over a fixed branch list
//! concurrently (`spec.md` §4.4 step 3).

use async_trait::async_trait;
use flowcraft_core::ids::NodeId;
use futures::future;
use serde_json::Value;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::{Strategy, UserFunctionRegistry};
use crate::result::StrategyResult;

/// Runs every node in `params.branches` concurrently via the attached
/// [`crate::context::GraphCallback`], each with the container's own
/// resolved input, and returns their outputs as an array in branch order.
///
/// A branch that suspends propagates the suspension; this means a
/// parallel container cannot partially complete — all branches must run
/// to completion together.
pub struct ParallelContainerStrategy;

#[async_trait]
impl Strategy for ParallelContainerStrategy {
    async fn run(
        &self,
        ctx: &ActionContext,
        params: Option<&Value>,
        _functions: &UserFunctionRegistry,
    ) -> Result<StrategyResult, ActionError> {
        let branches: Vec<NodeId> = params
            .and_then(|p| p.get("branches"))
            .and_then(Value::as_array)
            .ok_or_else(|| ActionError::Execution("parallel-container: params.branches is required".into()))?
            .iter()
            .filter_map(Value::as_str)
            .map(NodeId::new)
            .collect();

        let graph = ctx.require_graph()?;
        let results = future::join_all(branches.iter().map(|branch| {
            let input = ctx.input.clone();
            async move { graph.run_node(branch, input).await }
        }))
        .await;

        let mut outputs = Vec::with_capacity(results.len());
        for result in results {
            match result? {
                StrategyResult::Complete(out) => outputs.push(out.output),
                StrategyResult::Suspend(reason) => return Ok(StrategyResult::Suspend(reason)),
            }
        }

        Ok(StrategyResult::success(Value::Array(outputs)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use flowcraft_blueprint::Blueprint;
    use flowcraft_context::InMemoryAsyncContext;
    use flowcraft_core::ids::{BlueprintId, RunId};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::context::GraphCallback;

    struct EchoGraph;

    #[async_trait]
    impl GraphCallback for EchoGraph {
        async fn run_node(&self, node_id: &NodeId, input: Value) -> Result<StrategyResult, ActionError> {
            Ok(StrategyResult::success(serde_json::json!({"branch": node_id.as_str(), "input": input})))
        }

        async fn run_subflow(&self, _blueprint: &Blueprint, _input: Value) -> Result<Value, ActionError> {
            unimplemented!("not exercised by parallel-container tests")
        }
    }

    fn test_context() -> ActionContext {
        ActionContext {
            run_id: RunId::new(),
            blueprint_id: BlueprintId::new("bp"),
            node_id: NodeId::new("fanout"),
            attempt: 1,
            input: Value::from("seed"),
            shared: Arc::new(InMemoryAsyncContext::new()),
            cancellation: CancellationToken::new(),
            graph: Some(Arc::new(EchoGraph)),
        }
    }

    #[tokio::test]
    async fn collects_branch_outputs_in_branch_order() {
        let ctx = test_context();
        let params = serde_json::json!({"branches": ["a", "b", "c"]});
        let result = ParallelContainerStrategy.run(&ctx, Some(&params), &UserFunctionRegistry::new()).await.unwrap();
        match result {
            StrategyResult::Complete(out) => {
                let names: Vec<_> = out.output.as_array().unwrap().iter().map(|v| v["branch"].clone()).collect();
                assert_eq!(names, vec![Value::from("a"), Value::from("b"), Value::from("c")]);
            }
            StrategyResult::Suspend(_) => panic!("expected Complete"),
        }
    }

    #[tokio::test]
    async fn missing_branches_is_an_error() {
        let ctx = test_context();
        let err = ParallelContainerStrategy
            .run(&ctx, Some(&serde_json::json!({})), &UserFunctionRegistry::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Execution(_)));
    }
}
