//! Blueprint validation errors.

use flowcraft_core::error::{Classify, ErrorKind};
use flowcraft_core::ids::NodeId;
use thiserror::Error;

/// Errors raised while analyzing or validating a blueprint.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BlueprintError {
    /// An edge referenced a node id that is not present in the blueprint.
    #[error("edge references unknown node {0}")]
    UnknownNode(NodeId),
    /// Two nodes in the same blueprint declared the same id.
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),
    /// The blueprint has no nodes.
    #[error("blueprint has no nodes")]
    Empty,
}

impl Classify for BlueprintError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
