//! The async, distributed-capable context flavor (`spec.md` §3).

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::ContextError;
use crate::patch::PatchOperation;

/// Promise-returning key-value access backed by a remote store.
///
/// Distributed workers reconstruct one of these per job from the run's
/// shared context store (`spec.md` §4.7).
#[async_trait]
pub trait AsyncContext: Send + Sync {
    /// Read a value by key.
    async fn get(&self, key: &str) -> Result<Option<Value>, ContextError>;
    /// Upsert a value.
    async fn set(&self, key: &str, value: Value) -> Result<(), ContextError>;
    /// Whether `key` is present.
    async fn has(&self, key: &str) -> Result<bool, ContextError>;
    /// Remove `key`, returning whether it was present.
    async fn delete(&self, key: &str) -> Result<bool, ContextError>;
    /// A snapshot of the entire context as a JSON object.
    async fn to_json(&self) -> Result<Value, ContextError>;
    /// Apply a batch of operations in one round trip.
    async fn patch(&self, ops: Vec<PatchOperation>) -> Result<(), ContextError> {
        for op in ops {
            match op {
                PatchOperation::Set { key, value } => self.set(&key, value).await?,
                PatchOperation::Delete { key } => {
                    self.delete(&key).await?;
                }
            }
        }
        Ok(())
    }
}

/// An in-memory [`AsyncContext`], standing in for a remote store in tests
/// and single-process distributed-adapter exercises.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAsyncContext {
    map: Arc<RwLock<IndexMap<String, Value>>>,
}

impl InMemoryAsyncContext {
    /// Construct an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a context pre-populated from a JSON object.
    #[must_use]
    pub fn from_initial(initial: Value) -> Self {
        let ctx = Self::new();
        if let Value::Object(map) = initial {
            let mut guard = ctx.map.write();
            for (k, v) in map {
                guard.insert(k, v);
            }
        }
        ctx
    }
}

#[async_trait]
impl AsyncContext for InMemoryAsyncContext {
    async fn get(&self, key: &str) -> Result<Option<Value>, ContextError> {
        Ok(self.map.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), ContextError> {
        self.map.write().insert(key.to_owned(), value);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, ContextError> {
        Ok(self.map.read().contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool, ContextError> {
        Ok(self.map.write().shift_remove(key).is_some())
    }

    async fn to_json(&self) -> Result<Value, ContextError> {
        let guard = self.map.read();
        Ok(Value::Object(guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let ctx = InMemoryAsyncContext::new();
        ctx.set("k", serde_json::json!(1)).await.unwrap();
        assert_eq!(ctx.get("k").await.unwrap(), Some(serde_json::json!(1)));
    }

    #[tokio::test]
    async fn default_patch_applies_ops_in_order() {
        let ctx = InMemoryAsyncContext::new();
        ctx.patch(vec![
            PatchOperation::Set { key: "a".into(), value: serde_json::json!(1) },
            PatchOperation::Set { key: "b".into(), value: serde_json::json!(2) },
            PatchOperation::Delete { key: "a".into() },
        ])
        .await
        .unwrap();
        assert_eq!(ctx.get("a").await.unwrap(), None);
        assert_eq!(ctx.get("b").await.unwrap(), Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn clone_shares_the_same_backing_map() {
        let ctx = InMemoryAsyncContext::new();
        let clone = ctx.clone();
        ctx.set("k", serde_json::json!(true)).await.unwrap();
        assert_eq!(clone.get("k").await.unwrap(), Some(serde_json::json!(true)));
    }
}
