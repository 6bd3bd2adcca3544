//! Orchestrator-level errors (`spec.md` §7).

use flowcraft_blueprint::BlueprintError;
use flowcraft_core::error::{Classify, ErrorKind};
use flowcraft_core::ids::NodeId;
use thiserror::Error;

/// Errors raised while running a blueprint to completion.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Blueprint analysis rejected the graph (unknown node, duplicate id,
    /// empty graph).
    #[error(transparent)]
    Blueprint(#[from] BlueprintError),
    /// A node's strategy pipeline failed after retry/fallback.
    #[error(transparent)]
    Action(#[from] flowcraft_action::ActionError),
    /// The run's context store rejected a read or write.
    #[error(transparent)]
    Context(#[from] flowcraft_context::ContextError),
    /// The frontier emptied without every terminal node completing
    /// (`spec.md` §8, boundary behavior "stalled").
    #[error("run stalled: frontier is empty but {0} has not completed")]
    Stalled(NodeId),
    /// A job referenced a blueprint version that does not match the run's
    /// pinned version.
    #[error("blueprint {0} version mismatch")]
    VersionMismatch(flowcraft_core::ids::BlueprintId),
    /// The run's cancellation token fired.
    #[error("run cancelled")]
    Cancelled,
}

impl Classify for EngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Blueprint(_) => ErrorKind::Validation,
            Self::Action(e) => e.kind(),
            Self::Context(_) => ErrorKind::Coordination,
            Self::Stalled(_) => ErrorKind::Fatal,
            Self::VersionMismatch(_) => ErrorKind::BlueprintVersionMismatch,
            Self::Cancelled => ErrorKind::Fatal,
        }
    }
}
