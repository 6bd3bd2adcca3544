//! Shared identifiers and error classification for the Flowcraft workflow engine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod ids;

/// Reserved context key prefixes and well-known keys (`spec.md` §3, §6).
pub mod reserved {
    /// Prefix under which a node's output is stored: `_outputs.<nodeId>`.
    pub const OUTPUTS_PREFIX: &str = "_outputs.";
    /// Prefix under which an edge-transformed input override is stored: `_inputs.<nodeId>`.
    pub const INPUTS_PREFIX: &str = "_inputs.";
    /// The key under which the run's pinned blueprint id is stored.
    pub const BLUEPRINT_ID: &str = "blueprintId";
    /// The key under which the run's pinned blueprint version is stored.
    pub const BLUEPRINT_VERSION: &str = "blueprintVersion";

    /// Build the reserved output key for a node.
    #[must_use]
    pub fn output_key(node_id: &str) -> String {
        format!("{OUTPUTS_PREFIX}{node_id}")
    }

    /// Build the reserved input-override key for a node.
    #[must_use]
    pub fn input_key(node_id: &str) -> String {
        format!("{INPUTS_PREFIX}{node_id}")
    }

}

/// Re-exports of the most commonly used types.
pub mod prelude {
    pub use crate::error::{Classify, ErrorKind};
    pub use crate::ids::{BlueprintId, ExecutionId, NodeId, RunId};
    pub use crate::reserved;
}
