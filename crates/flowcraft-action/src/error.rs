//! Executor errors (`spec.md` §7).

use flowcraft_core::error::{Classify, ErrorKind};
use thiserror::Error;

/// Errors raised while resolving input, dispatching a strategy, or
/// publishing a node's result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ActionError {
    /// The strategy itself returned an application-level error. Subject
    /// to retry/fallback.
    #[error("node execution failed: {0}")]
    Execution(String),
    /// The strategy exceeded its configured `timeout`.
    #[error("node timed out")]
    Timeout,
    /// The node's `uses` key does not resolve against any registry.
    #[error("no strategy registered for key {0:?}")]
    UnknownStrategy(String),
    /// A `function`/`batch`-worker name does not resolve against the
    /// user function registry.
    #[error("no user function registered for name {0:?}")]
    UnknownFunction(String),
    /// A `subflow` node referenced a blueprint with no runner configured,
    /// or the runner itself failed.
    #[error("subflow {node} failed: {source}")]
    Subflow {
        /// The subflow node's id.
        node: String,
        /// The underlying error from the child run.
        #[source]
        source: Box<ActionError>,
    },
    /// The run's cancellation token fired mid-execution.
    #[error("execution cancelled")]
    Cancelled,
    /// Any error explicitly marked fatal; ends the run immediately.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl Classify for ActionError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Execution(_) => ErrorKind::NodeExecution,
            Self::Timeout => ErrorKind::Timeout,
            Self::UnknownStrategy(_) | Self::UnknownFunction(_) => ErrorKind::Validation,
            Self::Subflow { .. } => ErrorKind::NodeExecution,
            Self::Cancelled | Self::Fatal(_) => ErrorKind::Fatal,
        }
    }
}
