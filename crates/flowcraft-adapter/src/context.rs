//! How a worker obtains the `AsyncContext` handle for a run (`spec.md`
//! §4.7): in production this wraps the same remote store the
//! coordination keys live in; [`InMemoryContextFactory`] stands in for
//! tests and single-process exercises.

use std::collections::HashMap;
use std::sync::Arc;

use flowcraft_context::{AsyncContext, InMemoryAsyncContext};
use flowcraft_core::ids::RunId;
use parking_lot::Mutex;

/// Produces the shared context handle a worker reconstructs per job.
pub trait ContextFactory: Send + Sync {
    /// The `AsyncContext` backing `run_id`, creating it on first use.
    fn context_for(&self, run_id: RunId) -> Arc<dyn AsyncContext>;
}

fn _assert_context_factory_is_object_safe(_: &dyn ContextFactory) {}
fn _takes_boxed_context_factory(_: Box<dyn ContextFactory>) {}

/// A process-local `ContextFactory` backed by one `InMemoryAsyncContext`
/// per run, shared by every caller that asks for the same `run_id`.
#[derive(Default)]
pub struct InMemoryContextFactory {
    contexts: Mutex<HashMap<RunId, Arc<dyn AsyncContext>>>,
}

impl InMemoryContextFactory {
    /// A factory with no runs materialized yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextFactory for InMemoryContextFactory {
    fn context_for(&self, run_id: RunId) -> Arc<dyn AsyncContext> {
        self.contexts
            .lock()
            .entry(run_id)
            .or_insert_with(|| Arc::new(InMemoryAsyncContext::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_same_run_id_returns_the_same_backing_context() {
        let factory = InMemoryContextFactory::new();
        let run = RunId::new();
        let a = factory.context_for(run);
        let b = factory.context_for(run);
        a.set("k", serde_json::json!(1)).await.unwrap();
        assert_eq!(b.get("k").await.unwrap(), Some(serde_json::json!(1)));
    }

    #[tokio::test]
    async fn distinct_runs_get_distinct_contexts() {
        let factory = InMemoryContextFactory::new();
        let a = factory.context_for(RunId::new());
        let b = factory.context_for(RunId::new());
        a.set("k", serde_json::json!(1)).await.unwrap();
        assert_eq!(b.get("k").await.unwrap(), None);
    }
}
