//! Input resolution: turning a node's `inputs` declaration plus the run's
//! shared context into the value a strategy actually receives
//! (`spec.md` §4.4 step 1).

use flowcraft_blueprint::{AliasSource, NodeDefinition, NodeInputs};
use flowcraft_core::reserved::{input_key, output_key};
use serde_json::{Map, Value};

/// A read-only view over context used only for input resolution, so this
/// module can be tested without a full `AsyncContext`.
pub trait ContextLookup: Send + Sync {
    /// Look up a single key, returning `None` when absent or `Value::Null`.
    fn lookup(&self, key: &str) -> Option<Value>;
}

impl ContextLookup for Map<String, Value> {
    fn lookup(&self, key: &str) -> Option<Value> {
        self.get(key).filter(|v| !v.is_null()).cloned()
    }
}

/// Resolve a single source key: a bare predecessor id expands to
/// `_outputs.<id>`; anything already containing a `.` (e.g. `_inputs.x`,
/// a literal context key) is used verbatim.
fn resolve_key(ctx: &dyn ContextLookup, key: &str) -> Option<Value> {
    if key.contains('.') {
        ctx.lookup(key)
    } else {
        ctx.lookup(&output_key(key)).or_else(|| ctx.lookup(key))
    }
}

fn resolve_alias(ctx: &dyn ContextLookup, source: &AliasSource) -> Option<Value> {
    match source {
        AliasSource::One(key) => resolve_key(ctx, key),
        AliasSource::Many(keys) => keys.iter().find_map(|k| resolve_key(ctx, k)),
    }
}

/// Resolve `node`'s input against `ctx` and the node's own predecessor
/// list, following the four-branch contract of `spec.md` §4.4 step 1:
///
/// - `inputs` absent: fall back to `_inputs.<id>` if set, else the
///   concatenation (as a JSON array) of every predecessor's output.
/// - `inputs` is a single string: that key (or `_outputs.<key>` when bare).
/// - `inputs` is a list: the first key in the list that resolves to a
///   defined value.
/// - `inputs` is an alias map: an object built from each entry, itself
///   resolved via the single/list rules.
#[must_use]
pub fn resolve_input(node: &NodeDefinition, predecessors: &[String], ctx: &dyn ContextLookup) -> Value {
    match &node.inputs {
        Some(NodeInputs::Single(key)) => resolve_key(ctx, key).unwrap_or(Value::Null),
        Some(NodeInputs::List(keys)) => keys.iter().find_map(|k| resolve_key(ctx, k)).unwrap_or(Value::Null),
        Some(NodeInputs::Aliased(map)) => {
            let mut out = Map::new();
            for (alias, source) in map {
                out.insert(alias.clone(), resolve_alias(ctx, source).unwrap_or(Value::Null));
            }
            Value::Object(out)
        }
        None => {
            if let Some(v) = ctx.lookup(&input_key(node.id.as_str())) {
                return v;
            }
            if predecessors.is_empty() {
                return Value::Null;
            }
            if predecessors.len() == 1 {
                return resolve_key(ctx, &predecessors[0]).unwrap_or(Value::Null);
            }
            Value::Array(predecessors.iter().map(|p| resolve_key(ctx, p).unwrap_or(Value::Null)).collect())
        }
    }
}
