//! Run-scoped context storage for Flowcraft: a synchronous in-process
//! flavor, an async distributed-capable flavor, and a delta-tracking
//! wrapper, plus a stable snapshot serializer.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod r#async;
pub mod error;
pub mod patch;
pub mod serializer;
pub mod sync;
pub mod tracked;

pub use error::ContextError;
pub use patch::PatchOperation;
pub use r#async::{AsyncContext, InMemoryAsyncContext};
pub use sync::{InMemoryContext, SyncContext};
pub use tracked::TrackedContext;

/// Re-exports of the most commonly used types.
pub mod prelude {
    pub use crate::{
        AsyncContext, ContextError, InMemoryAsyncContext, InMemoryContext, PatchOperation,
        SyncContext, TrackedContext,
    };
}
