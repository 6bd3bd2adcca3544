//! What one [`crate::Stepper::next`] call produced.

use flowcraft_action::SuspendReason;
use flowcraft_core::ids::NodeId;
use serde_json::Value;

/// The result of advancing the stepper by exactly one node.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// `node_id` ran to completion; `output` is now at `_outputs.<node_id>`.
    Completed {
        /// The node that ran.
        node_id: NodeId,
        /// Its strategy output.
        output: Value,
    },
    /// `node_id` parked; call [`crate::Stepper::resume`] to continue it.
    Suspended {
        /// The node that parked.
        node_id: NodeId,
        /// Why it parked.
        reason: SuspendReason,
    },
    /// `node_id` failed after retry/fallback; `reason` is the error's
    /// display text. Its successors are left unready (`spec.md` §7
    /// describes the adapter's poison-pill equivalent for this case;
    /// the stepper simply stops advancing that branch).
    Failed {
        /// The node that failed.
        node_id: NodeId,
        /// The error's display text.
        reason: String,
    },
}

impl StepOutcome {
    /// The node this outcome concerns.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Completed { node_id, .. } | Self::Suspended { node_id, .. } | Self::Failed { node_id, .. } => node_id,
        }
    }
}
