//! Coordination-store key shapes (`spec.md` §4.9). TTLs for the keys
//! built here are deployment-tunable via [`crate::AdapterConfig`].

use flowcraft_core::ids::{NodeId, RunId};

/// `flowcraft:fanin:poison:<run>:<node>` — set when an `"all"`-join
/// predecessor fails fatally; every successor reading this must fail
/// without running.
#[must_use]
pub fn fanin_poison_key(run: RunId, node: &NodeId) -> String {
    format!("flowcraft:fanin:poison:{run}:{node}")
}

/// `flowcraft:fanin:cancel:<run>:<node>` — set when the winner of an
/// `"any"`-join predecessor's race fails fatally; losing branches that
/// later check this must fail instead of enqueuing.
#[must_use]
pub fn fanin_cancel_key(run: RunId, node: &NodeId) -> String {
    format!("flowcraft:fanin:cancel:{run}:{node}")
}

/// `flowcraft:joinlock:<run>:<node>` — a permanent (per-run) lock that
/// the first predecessor of an `"any"`-join node acquires via
/// `setIfNotExist`; whoever wins enqueues the node, everyone else backs
/// off.
#[must_use]
pub fn joinlock_key(run: RunId, node: &NodeId) -> String {
    format!("flowcraft:joinlock:{run}:{node}")
}

/// `flowcraft:fanin:<run>:<node>` — an `"all"`-join node's predecessor
/// counter, incremented by each arriving predecessor and deleted once
/// it reaches the node's predecessor count.
#[must_use]
pub fn fanin_counter_key(run: RunId, node: &NodeId) -> String {
    format!("flowcraft:fanin:{run}:{node}")
}

/// `flowcraft:nodelock:<run>:<node>` — a short-lived lock taken during
/// reconciliation so two concurrent reconcile passes do not both
/// re-enqueue the same node.
#[must_use]
pub fn nodelock_key(run: RunId, node: &NodeId) -> String {
    format!("flowcraft:nodelock:{run}:{node}")
}

/// `flowcraft:blueprint:<runId>` — fallback record of
/// `{blueprintId, blueprintVersion}` for a run, written once on the
/// first job handled for it (`spec.md` §4.7 step 3).
#[must_use]
pub fn blueprint_fallback_key(run: RunId) -> String {
    format!("flowcraft:blueprint:{run}")
}

/// `flowcraft:cancel:<run>` — set to request cooperative cancellation
/// of an entire run (`spec.md` §5).
#[must_use]
pub fn cancel_key(run: RunId) -> String {
    format!("flowcraft:cancel:{run}")
}
