//! Composable strategy and user-function registries (`spec.md` §4.6,
//! "effective registry = built-in ⊕ user ⊕ blueprint-local").

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::result::StrategyResult;
use crate::strategies::{
    BatchStrategy, FunctionStrategy, LoopStrategy, ParallelContainerStrategy, SubflowStrategy,
    WaitStrategy,
};

/// A single node execution strategy, dispatched by a node's `uses` key.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Run one attempt given the resolved `ctx.input` and the node's
    /// strategy-specific `params`.
    async fn run(
        &self,
        ctx: &ActionContext,
        params: Option<&Value>,
        functions: &UserFunctionRegistry,
    ) -> Result<StrategyResult, ActionError>;
}

/// A plain user-supplied unit of work, named and invoked by the
/// `function`/`batch` strategies.
#[async_trait]
pub trait UserFunction: Send + Sync {
    /// Compute this function's output from `input`.
    async fn call(&self, input: Value) -> Result<Value, ActionError>;
}

struct ClosureFunction<F>(F);

#[async_trait]
impl<F, Fut> UserFunction for ClosureFunction<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ActionError>> + Send,
{
    async fn call(&self, input: Value) -> Result<Value, ActionError> {
        (self.0)(input).await
    }
}

/// Maps user function names to implementations, at two scopes: a run-wide
/// registry the caller passes into `run()`, and a blueprint-local one
/// declared alongside the blueprint itself. Lookups check blueprint-local
/// first, so a blueprint can shadow a run-wide name.
#[derive(Clone, Default)]
pub struct UserFunctionRegistry {
    functions: HashMap<String, Arc<dyn UserFunction>>,
    blueprint_local: HashMap<String, Arc<dyn UserFunction>>,
}

impl UserFunctionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function by trait object.
    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn UserFunction>) {
        self.functions.insert(name.into(), function);
    }

    /// Register a plain async closure as a named function.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
    {
        self.register(name, Arc::new(ClosureFunction(function)));
    }

    /// Register a function visible only within the blueprint that declares it.
    pub fn register_blueprint_local(&mut self, name: impl Into<String>, function: Arc<dyn UserFunction>) {
        self.blueprint_local.insert(name.into(), function);
    }

    /// Look up a function by name, blueprint-local first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn UserFunction>> {
        self.blueprint_local.get(name).or_else(|| self.functions.get(name))
    }

    /// Invoke a named function, or a `ActionError::UnknownFunction` if absent.
    pub async fn call(&self, name: &str, input: Value) -> Result<Value, ActionError> {
        self.get(name)
            .ok_or_else(|| ActionError::UnknownFunction(name.to_owned()))?
            .call(input)
            .await
    }
}

/// Maps a node's `uses` key to a [`Strategy`] implementation. Pre-populated
/// with the six built-ins; `register` composes a user-supplied or
/// blueprint-local strategy on top without replacing the built-ins.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// The built-in registry: `function`, `batch`, `loop`, `subflow`,
    /// `wait`, `parallel-container`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut strategies: HashMap<String, Arc<dyn Strategy>> = HashMap::new();
        strategies.insert("function".into(), Arc::new(FunctionStrategy));
        strategies.insert("batch".into(), Arc::new(BatchStrategy));
        strategies.insert("loop".into(), Arc::new(LoopStrategy));
        strategies.insert("subflow".into(), Arc::new(SubflowStrategy));
        strategies.insert("wait".into(), Arc::new(WaitStrategy));
        strategies.insert("parallel-container".into(), Arc::new(ParallelContainerStrategy));
        Self { strategies }
    }

    /// Register or override a strategy under `key`.
    pub fn register(&mut self, key: impl Into<String>, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(key.into(), strategy);
    }

    /// Look up a strategy by its `uses` key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<dyn Strategy>> {
        self.strategies.get(key)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_the_six_strategy_keys() {
        let registry = StrategyRegistry::with_builtins();
        for key in ["function", "batch", "loop", "subflow", "wait", "parallel-container"] {
            assert!(registry.get(key).is_some(), "missing builtin {key}");
        }
    }

    #[test]
    fn unknown_strategy_key_is_absent() {
        let registry = StrategyRegistry::with_builtins();
        assert!(registry.get("does-not-exist").is_none());
    }

    #[tokio::test]
    async fn registered_closure_is_callable_by_name() {
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("double", |v: Value| async move {
            Ok(Value::from(v.as_i64().unwrap_or(0) * 2))
        });
        let out = functions.call("double", Value::from(21)).await.unwrap();
        assert_eq!(out, Value::from(42));
    }

    #[tokio::test]
    async fn blueprint_local_shadows_run_wide_registration() {
        let mut functions = UserFunctionRegistry::new();
        functions.register_fn("greet", |_: Value| async { Ok(Value::from("hi")) });
        functions.register_blueprint_local(
            "greet",
            Arc::new(ClosureFunction(|_: Value| async { Ok(Value::from("shadowed")) })),
        );
        assert_eq!(functions.call("greet", Value::Null).await.unwrap(), Value::from("shadowed"));
    }

    #[tokio::test]
    async fn calling_an_unregistered_function_is_an_error() {
        let functions = UserFunctionRegistry::new();
        let err = functions.call("missing", Value::Null).await.unwrap_err();
        assert!(matches!(err, ActionError::UnknownFunction(_)));
    }
}
