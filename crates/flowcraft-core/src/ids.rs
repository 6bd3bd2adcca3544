//! Identifier types used throughout the engine.
//!
//! [`RunId`] is generated fresh per run and is UUID-backed. [`NodeId`] and
//! [`BlueprintId`] are author-supplied strings: a blueprint author picks
//! node ids and a blueprint id when authoring the graph, so these are
//! thin newtypes over `String` rather than generated identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a `String`-backed identifier newtype with the common derive
/// set used for map keys and deterministic test output.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the underlying `String`.
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// The unique id of a node within a blueprint.
    NodeId
);

string_id!(
    /// The id of a blueprint, stable across versions.
    BlueprintId
);

/// A UUID-backed identifier for a single run of a blueprint.
///
/// Created fresh on the first `run()` call (`spec.md` §3, "Lifecycles").
/// `ExecutionId` is an alias: the spec uses both names for the same
/// concept depending on whether the in-process or distributed vocabulary
/// is in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

/// Alias for [`RunId`] used by distributed-adapter vocabulary.
pub type ExecutionId = RunId;

impl RunId {
    /// Generate a fresh random run id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Construct from raw bytes (used when reconstructing from a
    /// persisted job envelope).
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse from its canonical hyphenated string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Raw bytes of the underlying UUID.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_roundtrips_through_string() {
        let id = NodeId::new("fetch-user");
        assert_eq!(id.as_str(), "fetch-user");
        assert_eq!(id.to_string(), "fetch-user");
    }

    #[test]
    fn node_id_is_usable_as_a_map_key() {
        use std::collections::HashMap;
        let mut map: HashMap<NodeId, u32> = HashMap::new();
        map.insert(NodeId::from("a"), 1);
        assert_eq!(map.get(&NodeId::from("a")), Some(&1));
        assert_eq!(map.get(&NodeId::from("b")), None);
    }

    #[test]
    fn node_ids_sort_deterministically() {
        let mut ids = vec![NodeId::from("c"), NodeId::from("a"), NodeId::from("b")];
        ids.sort();
        assert_eq!(ids, vec![NodeId::from("a"), NodeId::from("b"), NodeId::from("c")]);
    }

    #[test]
    fn run_id_generates_unique_values() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn run_id_parses_its_own_display_output() {
        let id = RunId::new();
        let parsed = RunId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn node_id_serializes_as_a_bare_string() {
        let id = NodeId::from("n1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"n1\"");
    }
}
