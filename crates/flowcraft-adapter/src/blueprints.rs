//! The `BlueprintStore` port: how a worker looks up a blueprint by id
//! before running one of its nodes (`spec.md` §4.7 step 1).

use std::collections::HashMap;

use async_trait::async_trait;
use flowcraft_blueprint::Blueprint;
use flowcraft_core::ids::BlueprintId;
use parking_lot::Mutex;

use crate::error::AdapterError;

/// Fetch a blueprint definition by id. Not named explicitly in the
/// external-interfaces section of the spec, but required to realize
/// "fetch blueprint by id; on miss, publish `{failed, reason}`".
#[async_trait]
pub trait BlueprintStore: Send + Sync {
    /// The blueprint registered under `id`, or `None` if unknown.
    async fn get(&self, id: &BlueprintId) -> Result<Option<Blueprint>, AdapterError>;
}

fn _assert_blueprint_store_is_object_safe(_: &dyn BlueprintStore) {}
fn _takes_boxed_blueprint_store(_: Box<dyn BlueprintStore>) {}

/// A process-local blueprint registry for tests and single-process
/// deployments.
#[derive(Default)]
pub struct InMemoryBlueprintStore {
    blueprints: Mutex<HashMap<BlueprintId, Blueprint>>,
}

impl InMemoryBlueprintStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { blueprints: Mutex::new(HashMap::new()) }
    }

    /// Register `blueprint` under its own id, replacing any prior entry.
    /// Stamps `metadata.created_at` with the registration time if the
    /// caller left it unset.
    pub fn insert(&self, mut blueprint: Blueprint) {
        let metadata = blueprint.metadata.get_or_insert_with(Default::default);
        if metadata.created_at.is_none() {
            metadata.created_at = Some(chrono::Utc::now());
        }
        self.blueprints.lock().insert(blueprint.id.clone(), blueprint);
    }
}

#[async_trait]
impl BlueprintStore for InMemoryBlueprintStore {
    async fn get(&self, id: &BlueprintId) -> Result<Option<Blueprint>, AdapterError> {
        Ok(self.blueprints.lock().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcraft_blueprint::NodeDefinition;

    #[tokio::test]
    async fn lookup_by_id_round_trips() {
        let store = InMemoryBlueprintStore::new();
        let bp = Blueprint::new("bp").with_node(NodeDefinition::new("a", "function"));
        store.insert(bp.clone());
        let fetched = store.get(&BlueprintId::from("bp")).await.unwrap();
        assert_eq!(fetched.unwrap().id, bp.id);
    }

    #[tokio::test]
    async fn unknown_id_is_none() {
        let store = InMemoryBlueprintStore::new();
        assert!(store.get(&BlueprintId::from("missing")).await.unwrap().is_none());
    }
}
