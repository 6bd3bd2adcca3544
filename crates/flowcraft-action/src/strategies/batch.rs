//! The `batch` strategy: map a registered worker function over an array
//! with bounded concurrency (`spec.md` §4.4 step 3).

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::{Strategy, UserFunctionRegistry};
use crate::result::StrategyResult;

fn string_param(params: Option<&Value>, key: &str) -> Result<String, ActionError> {
    params
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ActionError::Execution(format!("batch: params.{key} is required")))
}

/// Runs `params.worker` over each element of `ctx.input[params.inputKey]`
/// with at most `params.concurrency` in flight, writing the collected
/// results both as the node's own output and to the shared context under
/// `params.outputKey`.
pub struct BatchStrategy;

#[async_trait]
impl Strategy for BatchStrategy {
    async fn run(
        &self,
        ctx: &ActionContext,
        params: Option<&Value>,
        functions: &UserFunctionRegistry,
    ) -> Result<StrategyResult, ActionError> {
        let input_key = string_param(params, "inputKey")?;
        let worker = string_param(params, "worker")?;
        let output_key = string_param(params, "outputKey")?;
        let concurrency = params
            .and_then(|p| p.get("concurrency"))
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .filter(|n| *n > 0)
            .unwrap_or(1);

        let items = ctx
            .input
            .get(&input_key)
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| ActionError::Execution(format!("batch: input.{input_key} is not an array")))?;

        let mut indexed: Vec<(usize, Value)> = stream::iter(items.into_iter().enumerate())
            .map(|(i, item)| {
                let worker = worker.clone();
                async move { (i, functions.call(&worker, item).await) }
            })
            .buffer_unordered(concurrency)
            .map(|(i, result)| result.map(|v| (i, v)))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        indexed.sort_by_key(|(i, _)| *i);
        let outputs = Value::Array(indexed.into_iter().map(|(_, v)| v).collect());

        ctx.shared.set(&output_key, outputs.clone()).await.map_err(|e| {
            ActionError::Execution(format!("batch: failed writing {output_key}: {e}"))
        })?;

        Ok(StrategyResult::success(outputs))
    }
}
