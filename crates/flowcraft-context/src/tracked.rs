//! The delta-tracking context wrapper (`spec.md` §4.2).

use std::sync::Arc;

use async_trait::async_trait;
use flowcraft_core::ids::{NodeId, RunId};
use flowcraft_telemetry::event::{EventBus, ExecutionEvent};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::ContextError;
use crate::patch::PatchOperation;
use crate::r#async::AsyncContext;

/// Wraps an [`AsyncContext`], recording every mutation as a
/// [`PatchOperation`] and optionally emitting a `context:change` event
/// after each one. Distributed adapters flush deltas via one `patch()`
/// call per node to minimize round trips (`spec.md` §4.2).
pub struct TrackedContext {
    inner: Arc<dyn AsyncContext>,
    deltas: Mutex<Vec<PatchOperation>>,
    event_bus: Option<Arc<EventBus>>,
    execution_id: RunId,
}

impl TrackedContext {
    /// Wrap `inner`, with no event bus attached.
    #[must_use]
    pub fn new(inner: Arc<dyn AsyncContext>, execution_id: RunId) -> Self {
        Self {
            inner,
            deltas: Mutex::new(Vec::new()),
            event_bus: None,
            execution_id,
        }
    }

    /// Attach an event bus; every mutation after this call emits
    /// `context:change`.
    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Record a delta and emit the corresponding event, if a bus is attached.
    fn record(&self, op: PatchOperation, source_node: Option<&NodeId>) {
        if let Some(bus) = &self.event_bus {
            bus.emit(ExecutionEvent::ContextChange {
                execution_id: self.execution_id.to_string(),
                source_node: source_node.map(ToString::to_string),
                key: op.key().to_owned(),
            });
        }
        self.deltas.lock().push(op);
    }

    /// Mutate a key and attribute the resulting event to `source_node`.
    pub async fn set_from(
        &self,
        key: &str,
        value: Value,
        source_node: &NodeId,
    ) -> Result<(), ContextError> {
        self.inner.set(key, value.clone()).await?;
        self.record(PatchOperation::Set { key: key.to_owned(), value }, Some(source_node));
        Ok(())
    }

    /// All deltas recorded since the last [`Self::clear_deltas`].
    #[must_use]
    pub fn get_deltas(&self) -> Vec<PatchOperation> {
        self.deltas.lock().clone()
    }

    /// Discard all recorded deltas without applying them.
    pub fn clear_deltas(&self) {
        self.deltas.lock().clear();
    }

    /// Flush recorded deltas to the backing store as a single `patch`
    /// call, then clear them.
    pub async fn flush(&self) -> Result<(), ContextError> {
        let ops = {
            let mut guard = self.deltas.lock();
            std::mem::take(&mut *guard)
        };
        if ops.is_empty() {
            return Ok(());
        }
        self.inner.patch(ops).await
    }
}

#[async_trait]
impl AsyncContext for TrackedContext {
    async fn get(&self, key: &str) -> Result<Option<Value>, ContextError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), ContextError> {
        self.inner.set(key, value.clone()).await?;
        self.record(PatchOperation::Set { key: key.to_owned(), value }, None);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, ContextError> {
        self.inner.has(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, ContextError> {
        let existed = self.inner.delete(key).await?;
        self.record(PatchOperation::Delete { key: key.to_owned() }, None);
        Ok(existed)
    }

    async fn to_json(&self) -> Result<Value, ContextError> {
        self.inner.to_json().await
    }
}
