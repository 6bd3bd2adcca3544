//! Context errors.

use flowcraft_core::error::{Classify, ErrorKind};
use thiserror::Error;

/// Errors raised by an [`crate::r#async::AsyncContext`] backing store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContextError {
    /// The remote store was unreachable or returned an inconsistent result.
    #[error("context store unavailable: {0}")]
    StoreUnavailable(String),
    /// A value stored at `key` could not be interpreted as JSON.
    #[error("corrupt value at key {0}")]
    Corrupt(String),
}

impl Classify for ContextError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Coordination
    }
}
