//! What a node strategy produces (`spec.md` §4.4, §4.8).

use flowcraft_blueprint::{EdgeDefinition, NodeDefinition};
use serde_json::Value;

/// Why a strategy suspended instead of completing synchronously
/// (`spec.md` §4.8).
#[derive(Debug, Clone, PartialEq)]
pub enum SuspendReason {
    /// Resume after roughly `after_millis` have elapsed.
    Sleep {
        /// Delay in milliseconds before the scheduler resumes this node.
        after_millis: u64,
    },
    /// Resume when an external caller invokes `resume(runId, nodeId, payload)`
    /// with this event name.
    WaitForEvent {
        /// The event name this node is waiting for.
        name: String,
    },
    /// Resume via an adapter-registered webhook endpoint.
    WaitForWebhook {
        /// The URL the adapter registered for this node.
        url: String,
        /// The event name associated with the webhook.
        event: String,
    },
}

/// A completed strategy's payload: the value to publish, the optional
/// action tag used for edge routing, and any dynamically injected graph
/// extension (`spec.md` §4.5, "Dynamic nodes").
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    /// The value to store at `_outputs.<nodeId>`.
    pub output: Value,
    /// Selects outgoing edges whose `action` matches this value.
    pub action: Option<String>,
    /// Additional nodes to splice into the running graph.
    pub dynamic_nodes: Vec<NodeDefinition>,
    /// Additional edges to splice into the running graph.
    pub dynamic_edges: Vec<EdgeDefinition>,
    /// Set when this output came from the node's `config.fallback`
    /// function rather than the strategy itself (`spec.md` §4.4 step 5).
    pub fallback_used: bool,
}

impl StrategyOutput {
    /// Construct a plain output with no action tag or dynamic expansion.
    #[must_use]
    pub fn new(output: Value) -> Self {
        Self {
            output,
            action: None,
            dynamic_nodes: Vec::new(),
            dynamic_edges: Vec::new(),
            fallback_used: false,
        }
    }

    /// Attach an action tag, builder-style.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

/// The outcome of dispatching a single strategy attempt.
#[derive(Debug, Clone)]
pub enum StrategyResult {
    /// The strategy ran to completion.
    Complete(StrategyOutput),
    /// The strategy parked; the node's output is set only when `resume`
    /// later supplies a value.
    Suspend(SuspendReason),
}

impl StrategyResult {
    /// Shorthand for `Complete(StrategyOutput::new(output))`.
    #[must_use]
    pub fn success(output: Value) -> Self {
        Self::Complete(StrategyOutput::new(output))
    }
}
