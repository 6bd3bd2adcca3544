//! Stable encoding of context snapshots for transport and persistence
//! (`spec.md` §2, component 4; §8, "Serializer round-trip").

use serde_json::Value;

use crate::error::ContextError;

/// Encode a context snapshot (as produced by `to_json`) to a stable
/// string form. Object keys are sorted so two snapshots with the same
/// logical content always encode identically, which matters for
/// content-addressed persistence and for diffing reconciliation state.
#[must_use]
pub fn serialize(snapshot: &Value) -> String {
    let stable = stabilize(snapshot);
    serde_json::to_string(&stable).expect("serde_json::Value always serializes")
}

/// Decode a previously [`serialize`]d snapshot back into a [`Value`].
pub fn deserialize(encoded: &str) -> Result<Value, ContextError> {
    serde_json::from_str(encoded).map_err(|e| ContextError::Corrupt(e.to_string()))
}

/// Recursively rewrite object maps into a key-sorted form.
fn stabilize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), stabilize(v));
            }
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(stabilize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_all_values() {
        let original = serde_json::json!({
            "_outputs.A": "a",
            "blueprintId": "bp1",
            "nested": {"z": 1, "a": 2},
        });
        let encoded = serialize(&original);
        let decoded = deserialize(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn encoding_is_stable_regardless_of_key_insertion_order() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(serialize(&a), serialize(&b));
    }

    #[test]
    fn deserialize_rejects_malformed_input() {
        assert!(deserialize("{not json").is_err());
    }
}
