//! Adapter-level errors (`spec.md` §7).

use flowcraft_core::error::{Classify, ErrorKind};
use flowcraft_core::ids::{BlueprintId, NodeId};
use thiserror::Error;

/// Errors raised while running the distributed job handler.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    /// Blueprint analysis rejected the graph.
    #[error(transparent)]
    Blueprint(#[from] flowcraft_blueprint::BlueprintError),
    /// A node's strategy pipeline failed after retry/fallback.
    #[error(transparent)]
    Action(#[from] flowcraft_action::ActionError),
    /// The run's context store rejected a read or write.
    #[error(transparent)]
    Context(#[from] flowcraft_context::ContextError),
    /// The orchestrator failed while running a blueprint to completion.
    #[error(transparent)]
    Engine(#[from] flowcraft_engine::EngineError),
    /// No blueprint is registered under this id (`spec.md` §4.7 step 1).
    #[error("blueprint {0} not found")]
    UnknownBlueprint(BlueprintId),
    /// A job referenced a node id absent from its blueprint.
    #[error("node {0} not found in its blueprint")]
    UnknownNode(NodeId),
    /// A job's `blueprintVersion` does not match the run's pinned version
    /// (`spec.md` §4.7, "Versioning & compatibility").
    #[error("job for blueprint {0} rejected: version does not match the run's pinned version")]
    VersionMismatch(BlueprintId),
    /// The coordination store's backing connection or invariant failed.
    #[error("coordination store error: {0}")]
    Coordination(String),
    /// The queue binding's enqueue/dequeue/ack/publish call failed.
    #[error("queue error: {0}")]
    Queue(String),
}

impl Classify for AdapterError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Blueprint(_) => ErrorKind::Validation,
            Self::Action(e) => e.kind(),
            Self::Context(_) => ErrorKind::Coordination,
            Self::Engine(e) => e.kind(),
            Self::UnknownBlueprint(_) => ErrorKind::Fatal,
            Self::UnknownNode(_) => ErrorKind::Validation,
            Self::VersionMismatch(_) => ErrorKind::BlueprintVersionMismatch,
            Self::Coordination(_) => ErrorKind::Coordination,
            Self::Queue(_) => ErrorKind::Coordination,
        }
    }
}
