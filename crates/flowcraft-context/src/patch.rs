//! Batched context mutations (`spec.md` §3, §4.2).

use serde::{Deserialize, Serialize};

/// A single recorded mutation against a context.
///
/// Tracked contexts record one of these per `set`/`delete` call; async
/// contexts accept a batch of them via `patch(ops)` to minimize network
/// round-trips (`spec.md` §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOperation {
    /// Upsert `key` to `value`.
    Set {
        /// The key to set.
        key: String,
        /// The value to store.
        value: serde_json::Value,
    },
    /// Remove `key`, if present.
    Delete {
        /// The key to delete.
        key: String,
    },
}

impl PatchOperation {
    /// The key this operation targets.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_serializes_with_tagged_shape() {
        let op = PatchOperation::Set {
            key: "a".into(),
            value: serde_json::json!(1),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "set");
        assert_eq!(json["key"], "a");
        assert_eq!(json["value"], 1);
    }

    #[test]
    fn delete_serializes_with_tagged_shape() {
        let op = PatchOperation::Delete { key: "a".into() };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "delete");
    }

    #[test]
    fn key_accessor_works_for_both_variants() {
        assert_eq!(PatchOperation::Delete { key: "k".into() }.key(), "k");
        assert_eq!(
            PatchOperation::Set { key: "k".into(), value: serde_json::json!(null) }.key(),
            "k"
        );
    }
}
