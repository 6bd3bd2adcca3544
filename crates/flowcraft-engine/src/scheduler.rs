//! Awaiting-node index and resume tick (`spec.md` §4.8).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use flowcraft_core::ids::{NodeId, RunId};
use parking_lot::Mutex;

/// Why a run entry is parked in the [`Scheduler`]'s index.
#[derive(Debug, Clone, PartialEq)]
pub enum Awaiting {
    /// Resume once `Instant::now() >= resume_at`.
    Sleep {
        /// When this entry becomes resumable.
        resume_at: Instant,
    },
    /// Resume only when an external caller invokes `resume(runId, nodeId, payload)`.
    Event {
        /// The event name this node is waiting for.
        name: String,
    },
    /// Resume only when an adapter-registered webhook is invoked.
    Webhook {
        /// The URL the adapter registered for this node.
        url: String,
        /// The event name associated with the webhook.
        event: String,
    },
}

/// The index `{runId -> awaitingNodeId, resumeAt?}` of `spec.md` §4.8,
/// plus the periodic tick that scans it for sleeps ready to resume.
///
/// Distinct run/node pairs may both be parked at once (e.g. two branches
/// of the same run each waiting on a different event), so the index is
/// keyed by `(RunId, NodeId)`.
#[derive(Default)]
pub struct Scheduler {
    index: Mutex<HashMap<(RunId, NodeId), Awaiting>>,
}

impl Scheduler {
    /// An empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `node` of `run` pending `reason`.
    pub fn park(&self, run: RunId, node: NodeId, reason: Awaiting) {
        self.index.lock().insert((run, node), reason);
    }

    /// Convenience for a `sleep(after)` suspension.
    pub fn park_sleep(&self, run: RunId, node: NodeId, after: Duration) {
        self.park(run, node, Awaiting::Sleep { resume_at: Instant::now() + after });
    }

    /// Remove and return the parked reason for `(run, node)`, if any —
    /// called when an external `resume()` or a sleep tick fires it.
    pub fn take(&self, run: RunId, node: &NodeId) -> Option<Awaiting> {
        self.index.lock().remove(&(run, node.clone()))
    }

    /// Whether `(run, node)` is currently parked.
    #[must_use]
    pub fn is_parked(&self, run: RunId, node: &NodeId) -> bool {
        self.index.lock().contains_key(&(run, node.clone()))
    }

    /// Scan the index for sleeps whose `resume_at` has elapsed, removing
    /// and returning them (`spec.md` §4.8, "periodic tick").
    pub fn tick(&self) -> Vec<(RunId, NodeId)> {
        let now = Instant::now();
        let mut index = self.index.lock();
        let due: Vec<(RunId, NodeId)> = index
            .iter()
            .filter(|(_, reason)| matches!(reason, Awaiting::Sleep { resume_at } if *resume_at <= now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &due {
            index.remove(key);
        }
        due
    }

    /// Snapshot of every entry currently parked for `run`, without
    /// removing them.
    #[must_use]
    pub fn snapshot_for_run(&self, run: RunId) -> Vec<(NodeId, Awaiting)> {
        self.index
            .lock()
            .iter()
            .filter(|((r, _), _)| *r == run)
            .map(|((_, node), reason)| (node.clone(), reason.clone()))
            .collect()
    }

    /// Number of entries currently parked, across all runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_returns_only_sleeps_past_their_resume_time() {
        let scheduler = Scheduler::new();
        let run = RunId::new();
        scheduler.park_sleep(run, NodeId::from("due"), Duration::from_millis(0));
        scheduler.park_sleep(run, NodeId::from("not-due"), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(5));
        let due = scheduler.tick();
        assert_eq!(due, vec![(run, NodeId::from("due"))]);
        assert!(scheduler.is_parked(run, &NodeId::from("not-due")));
        assert!(!scheduler.is_parked(run, &NodeId::from("due")));
    }

    #[test]
    fn take_removes_an_event_wait_for_external_resume() {
        let scheduler = Scheduler::new();
        let run = RunId::new();
        scheduler.park(run, NodeId::from("n"), Awaiting::Event { name: "approved".into() });
        assert!(scheduler.is_parked(run, &NodeId::from("n")));
        let reason = scheduler.take(run, &NodeId::from("n")).unwrap();
        assert_eq!(reason, Awaiting::Event { name: "approved".into() });
        assert!(!scheduler.is_parked(run, &NodeId::from("n")));
    }

    #[test]
    fn taking_an_unparked_entry_returns_none() {
        let scheduler = Scheduler::new();
        assert!(scheduler.take(RunId::new(), &NodeId::from("n")).is_none());
    }
}
