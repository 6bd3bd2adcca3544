//! The `wait` strategy: park the node, to be resumed later
//! (`spec.md` §4.4 step 3, §4.8).

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::{Strategy, UserFunctionRegistry};
use crate::result::{StrategyResult, SuspendReason};

fn suspend_reason(params: Option<&Value>) -> Result<SuspendReason, ActionError> {
    let params = params.ok_or_else(|| ActionError::Execution("wait: params are required".into()))?;
    if let Some(millis) = params.get("sleepMillis").and_then(Value::as_u64) {
        return Ok(SuspendReason::Sleep { after_millis: millis });
    }
    if let Some(name) = params.get("event").and_then(Value::as_str) {
        return Ok(SuspendReason::WaitForEvent { name: name.to_owned() });
    }
    if let Some(webhook) = params.get("webhook") {
        let url = webhook.get("url").and_then(Value::as_str).unwrap_or_default().to_owned();
        let event = webhook.get("event").and_then(Value::as_str).unwrap_or_default().to_owned();
        return Ok(SuspendReason::WaitForWebhook { url, event });
    }
    Err(ActionError::Execution(
        "wait: params must set one of sleepMillis, event, webhook".into(),
    ))
}

/// Always suspends; the node's output is set only once an external
/// `resume(runId, nodeId, payload)` call or scheduler tick supplies a value.
pub struct WaitStrategy;

#[async_trait]
impl Strategy for WaitStrategy {
    async fn run(
        &self,
        _ctx: &ActionContext,
        params: Option<&Value>,
        _functions: &UserFunctionRegistry,
    ) -> Result<StrategyResult, ActionError> {
        Ok(StrategyResult::Suspend(suspend_reason(params)?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use flowcraft_context::InMemoryAsyncContext;
    use flowcraft_core::ids::{BlueprintId, NodeId, RunId};
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn test_context() -> ActionContext {
        ActionContext {
            run_id: RunId::new(),
            blueprint_id: BlueprintId::new("bp"),
            node_id: NodeId::new("sleep"),
            attempt: 1,
            input: Value::Null,
            shared: Arc::new(InMemoryAsyncContext::new()),
            cancellation: CancellationToken::new(),
            graph: None,
        }
    }

    #[tokio::test]
    async fn sleep_millis_yields_a_sleep_suspend_reason() {
        let ctx = test_context();
        let params = serde_json::json!({"sleepMillis": 5});
        let result = WaitStrategy.run(&ctx, Some(&params), &UserFunctionRegistry::new()).await.unwrap();
        match result {
            StrategyResult::Suspend(SuspendReason::Sleep { after_millis }) => assert_eq!(after_millis, 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn event_name_yields_a_wait_for_event_reason() {
        let ctx = test_context();
        let params = serde_json::json!({"event": "approval"});
        let result = WaitStrategy.run(&ctx, Some(&params), &UserFunctionRegistry::new()).await.unwrap();
        match result {
            StrategyResult::Suspend(SuspendReason::WaitForEvent { name }) => assert_eq!(name, "approval"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_params_is_an_error() {
        let ctx = test_context();
        let err = WaitStrategy.run(&ctx, None, &UserFunctionRegistry::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::Execution(_)));
    }
}
