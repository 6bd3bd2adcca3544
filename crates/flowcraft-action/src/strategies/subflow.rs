//! The `subflow` strategy: run a nested blueprint, mapping data in and
//! out (`spec.md` §4.4 step 3).

use async_trait::async_trait;
use flowcraft_blueprint::Blueprint;
use serde_json::Value;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::{Strategy, UserFunctionRegistry};
use crate::result::StrategyResult;

/// Runs `params.blueprint` (an embedded blueprint document) as a child
/// execution via the attached [`crate::context::GraphCallback`]. The
/// child receives `ctx.input` mapped through `params.inputs` when present
/// (an object merged over the container's own input), and its outputs
/// object is returned, projected through `params.outputs` when present.
///
/// Child failures propagate wrapped in [`ActionError::Subflow`], naming
/// this node, per `spec.md` §4.4.
pub struct SubflowStrategy;

fn project(value: &Value, keys: &[String]) -> Value {
    let mut out = serde_json::Map::new();
    for key in keys {
        if let Some(v) = value.get(key) {
            out.insert(key.clone(), v.clone());
        }
    }
    Value::Object(out)
}

#[async_trait]
impl Strategy for SubflowStrategy {
    async fn run(
        &self,
        ctx: &ActionContext,
        params: Option<&Value>,
        _functions: &UserFunctionRegistry,
    ) -> Result<StrategyResult, ActionError> {
        let params = params.ok_or_else(|| ActionError::Execution("subflow: params are required".into()))?;
        let blueprint: Blueprint = params
            .get("blueprint")
            .cloned()
            .ok_or_else(|| ActionError::Execution("subflow: params.blueprint is required".into()))
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| ActionError::Execution(format!("subflow: invalid blueprint: {e}")))
            })?;

        let mut child_input = ctx.input.clone();
        if let Some(Value::Object(overrides)) = params.get("inputs") {
            if let Value::Object(base) = &mut child_input {
                for (k, v) in overrides {
                    base.insert(k.clone(), v.clone());
                }
            } else {
                child_input = Value::Object(overrides.clone());
            }
        }

        let graph = ctx.require_graph()?;
        let child_output = graph.run_subflow(&blueprint, child_input).await.map_err(|e| ActionError::Subflow {
            node: ctx.node_id.as_str().to_owned(),
            source: Box::new(e),
        })?;

        let output = match params.get("outputs").and_then(Value::as_array) {
            Some(keys) => {
                let keys: Vec<String> = keys.iter().filter_map(Value::as_str).map(str::to_owned).collect();
                project(&child_output, &keys)
            }
            None => child_output,
        };

        Ok(StrategyResult::success(output))
    }
}
