//! The `function` strategy: invoke one registered user function
//! (`spec.md` §4.4 step 3).

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::{Strategy, UserFunctionRegistry};
use crate::result::StrategyResult;

/// Which function a `function`-strategy node invokes, resolved as
/// `params.function` (a string), falling back to the node's own id so
/// that `{"uses": "function"}` with no params calls a same-named function.
fn function_name(params: Option<&Value>, node_id: &str) -> String {
    params
        .and_then(|p| p.get("function"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| node_id.to_owned())
}

/// Invokes a single registered user function with the node's resolved input.
pub struct FunctionStrategy;

#[async_trait]
impl Strategy for FunctionStrategy {
    async fn run(
        &self,
        ctx: &ActionContext,
        params: Option<&Value>,
        functions: &UserFunctionRegistry,
    ) -> Result<StrategyResult, ActionError> {
        let name = function_name(params, ctx.node_id.as_str());
        let output = functions.call(&name, ctx.input.clone()).await?;
        Ok(StrategyResult::success(output))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use flowcraft_context::InMemoryAsyncContext;
    use flowcraft_core::ids::{BlueprintId, NodeId, RunId};
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn test_context(node_id: &str, input: Value) -> ActionContext {
        ActionContext {
            run_id: RunId::new(),
            blueprint_id: BlueprintId::new("bp"),
            node_id: NodeId::new(node_id),
            attempt: 1,
            input,
            shared: Arc::new(InMemoryAsyncContext::new()),
            cancellation: CancellationToken::new(),
            graph: None,
        }
    }

    #[tokio::test]
    async fn invokes_the_function_named_in_params() {
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("double", |v: Value| async move {
            Ok(Value::from(v.as_i64().unwrap_or(0) * 2))
        });
        let ctx = test_context("n1", Value::from(10));
        let params = serde_json::json!({"function": "double"});
        let result = FunctionStrategy.run(&ctx, Some(&params), &functions).await.unwrap();
        match result {
            StrategyResult::Complete(out) => assert_eq!(out.output, Value::from(20)),
            StrategyResult::Suspend(_) => panic!("expected Complete"),
        }
    }

    #[tokio::test]
    async fn falls_back_to_the_node_id_when_params_absent() {
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("greet", |_: Value| async { Ok(Value::from("hi")) });
        let ctx = test_context("greet", Value::Null);
        let result = FunctionStrategy.run(&ctx, None, &functions).await.unwrap();
        match result {
            StrategyResult::Complete(out) => assert_eq!(out.output, Value::from("hi")),
            StrategyResult::Suspend(_) => panic!("expected Complete"),
        }
    }

    #[tokio::test]
    async fn unregistered_function_surfaces_as_unknown_function() {
        let functions = UserFunctionRegistry::new();
        let ctx = test_context("missing", Value::Null);
        let err = FunctionStrategy.run(&ctx, None, &functions).await.unwrap_err();
        assert!(matches!(err, ActionError::UnknownFunction(_)));
    }
}
