//! Errors raised while stepping a blueprint (`spec.md` §7).

use flowcraft_core::error::{Classify, ErrorKind};
use flowcraft_core::ids::NodeId;
use thiserror::Error;

/// Errors raised by [`crate::Stepper`].
///
/// A node's strategy pipeline failing after retry/fallback is not an
/// error here: [`crate::Stepper::next`] reports it as
/// [`crate::StepOutcome::Failed`] instead, so a caller stepping through
/// a blueprint can observe and rewind past a failure rather than having
/// it unwind the whole session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StepperError {
    /// The step's context store rejected a read or write.
    #[error(transparent)]
    Context(#[from] flowcraft_context::ContextError),
    /// Blueprint analysis, traverser, or edge-transform machinery
    /// reported an error while building or rebuilding the step state.
    #[error(transparent)]
    Engine(#[from] flowcraft_engine::EngineError),
    /// `resume` named a node that is not currently suspended.
    #[error("node {0} is not awaiting resume")]
    NotAwaiting(NodeId),
}

impl Classify for StepperError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Context(_) => ErrorKind::Coordination,
            Self::Engine(e) => e.kind(),
            Self::NotAwaiting(_) => ErrorKind::Validation,
        }
    }
}
