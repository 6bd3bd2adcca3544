//! Shared error classification.
//!
//! `spec.md` §7 defines six error *kinds* (tags, not types): every crate's
//! leaf error enum implements [`Classify`] so the orchestrator and
//! distributed adapter can make retry/fallback/abort decisions without
//! knowing the concrete error type that produced them.

use std::fmt;

/// The six error kinds of `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A node strategy threw; subject to retry/fallback.
    NodeExecution,
    /// A node strategy exceeded its configured timeout.
    Timeout,
    /// Blueprint analysis failed (unknown node, unknown strategy, strict-mode cycle).
    Validation,
    /// The coordination store was unavailable or returned an inconsistent result.
    Coordination,
    /// A job referenced a blueprint version that does not match the run's pinned version.
    BlueprintVersionMismatch,
    /// Any error that must end the run immediately.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NodeExecution => "NODE_EXECUTION",
            Self::Timeout => "TIMEOUT",
            Self::Validation => "VALIDATION",
            Self::Coordination => "COORDINATION",
            Self::BlueprintVersionMismatch => "BLUEPRINT_VERSION_MISMATCH",
            Self::Fatal => "FATAL",
        };
        f.write_str(s)
    }
}

/// Implemented by every crate's leaf error type so that error handling
/// decisions (retry? fallback? abort the run?) can be made uniformly by
/// the orchestrator and distributed adapter.
pub trait Classify {
    /// The tag this error should be reported and matched under.
    fn kind(&self) -> ErrorKind;

    /// Whether the orchestrator/executor should retry the operation that
    /// produced this error.
    fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NodeExecution | ErrorKind::Timeout | ErrorKind::Coordination
        )
    }

    /// Whether this error must end the run immediately, bypassing retry
    /// and fallback.
    fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Fatal | ErrorKind::Validation | ErrorKind::BlueprintVersionMismatch
        )
    }
}
