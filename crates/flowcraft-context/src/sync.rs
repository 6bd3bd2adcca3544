//! The in-process, synchronous context flavor (`spec.md` §3).

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

/// Direct, in-process key-value access used by in-process runs.
///
/// Ordered-insertion: iteration order of [`SyncContext::to_json`] matches
/// the order keys were first set, matching the spec's "ordered-insertion
/// map" requirement.
pub trait SyncContext: Send + Sync {
    /// Read a value by key.
    fn get(&self, key: &str) -> Option<Value>;
    /// Upsert a value.
    fn set(&self, key: &str, value: Value);
    /// Whether `key` is present.
    fn has(&self, key: &str) -> bool;
    /// Remove `key`, returning whether it was present.
    fn delete(&self, key: &str) -> bool;
    /// A snapshot of the entire context as a JSON object.
    fn to_json(&self) -> Value;
}

/// The default in-memory [`SyncContext`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryContext {
    map: RwLock<IndexMap<String, Value>>,
}

impl InMemoryContext {
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

impl SyncContext for InMemoryContext {
    fn get(&self, key: &str) -> Option<Value> {
        self.map.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.map.write().insert(key.to_owned(), value);
    }

    fn has(&self, key: &str) -> bool {
        self.map.read().contains_key(key)
    }

    fn delete(&self, key: &str) -> bool {
        self.map.write().shift_remove(key).is_some()
    }

    fn to_json(&self) -> Value {
        let guard = self.map.read();
        Value::Object(guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}
