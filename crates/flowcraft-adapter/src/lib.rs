//! A queue-agnostic distributed execution adapter for Flowcraft
//! (`spec.md` §4.7-§4.9): the coordination-store-backed fan-in and
//! poison/cancellation pills, the worker job handler, reconciliation,
//! and the small ports a concrete queue/store binding implements.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod base;
pub mod blueprints;
pub mod config;
pub mod context;
pub mod error;
pub mod keys;
pub mod queue;
pub mod store;

pub use base::BaseAdapter;
pub use blueprints::{BlueprintStore, InMemoryBlueprintStore};
pub use config::AdapterConfig;
pub use context::{ContextFactory, InMemoryContextFactory};
pub use error::AdapterError;
pub use queue::{FinalResultEnvelope, FinalStatus, InMemoryQueueBinding, JobEnvelope, QueueBinding};
pub use store::{CoordinationStore, InMemoryCoordinationStore};

/// Re-exports of the most commonly used types.
pub mod prelude {
    pub use crate::{
        AdapterConfig, AdapterError, BaseAdapter, BlueprintStore, ContextFactory, CoordinationStore,
        FinalResultEnvelope, FinalStatus, InMemoryBlueprintStore, InMemoryContextFactory,
        InMemoryCoordinationStore, InMemoryQueueBinding, JobEnvelope, QueueBinding,
    };
}
