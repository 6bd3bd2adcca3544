//! Frontier computation, join arbitration, and edge taxonomy dispatch
//! (`spec.md` §4.4 "Edge taxonomy", §4.5).

use std::collections::HashSet;

use flowcraft_action::StrategyOutput;
use flowcraft_blueprint::{Blueprint, BlueprintAnalysis, EdgeDefinition, JoinStrategy, NodeDefinition};
use flowcraft_core::ids::NodeId;
use flowcraft_expression::{truthy, Evaluator};
use serde_json::Value;

use crate::error::EngineError;

/// Owns the running blueprint (which may grow via dynamic node/edge
/// injection), the completed set, and `"any"`-join arbitration state.
pub struct Traverser {
    blueprint: Blueprint,
    analysis: BlueprintAnalysis,
    completed: HashSet<NodeId>,
    cancelled: HashSet<NodeId>,
    /// `"any"`-join nodes that have already been scheduled once; later
    /// predecessor completions must not re-trigger them (`spec.md` §4.5).
    any_triggered: HashSet<NodeId>,
}

impl Traverser {
    /// Analyze `blueprint` and seed an empty traversal over it.
    pub fn new(blueprint: Blueprint) -> Result<Self, EngineError> {
        let analysis = BlueprintAnalysis::compute(&blueprint)?;
        Ok(Self {
            blueprint,
            analysis,
            completed: HashSet::new(),
            cancelled: HashSet::new(),
            any_triggered: HashSet::new(),
        })
    }

    /// The blueprint as currently known, including any dynamic extensions.
    #[must_use]
    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    /// Structural facts recomputed after the most recent dynamic injection.
    #[must_use]
    pub fn analysis(&self) -> &BlueprintAnalysis {
        &self.analysis
    }

    /// Whether `node` has completed successfully.
    #[must_use]
    pub fn is_completed(&self, node: &NodeId) -> bool {
        self.completed.contains(node)
    }

    /// Whether `node` lost an `"any"` join race or was poisoned.
    #[must_use]
    pub fn is_cancelled(&self, node: &NodeId) -> bool {
        self.cancelled.contains(node)
    }

    /// Whether every terminal node of the current blueprint has completed.
    #[must_use]
    pub fn all_terminal_nodes_completed(&self) -> bool {
        self.analysis.terminal_node_ids.iter().all(|id| self.completed.contains(id))
    }

    /// The ready set: nodes not completed, not cancelled, not already
    /// in-flight (`exclude`), and whose join strategy is satisfied
    /// (`spec.md` §4.5 "`next()` tick").
    #[must_use]
    pub fn ready_nodes(&self, exclude: &HashSet<NodeId>) -> Vec<NodeId> {
        self.blueprint
            .nodes
            .iter()
            .map(|n| &n.id)
            .filter(|id| !self.completed.contains(*id))
            .filter(|id| !self.cancelled.contains(*id))
            .filter(|id| !exclude.contains(*id))
            .filter(|id| self.predecessors_satisfied(id))
            .cloned()
            .collect()
    }

    fn predecessors_satisfied(&self, node: &NodeId) -> bool {
        let Some(def) = self.blueprint.node(node) else { return false };
        let preds = self.analysis.predecessors_of(node);
        match def.join_strategy() {
            JoinStrategy::All => preds.iter().all(|p| self.completed.contains(p)),
            JoinStrategy::Any => {
                !self.any_triggered.contains(node) && preds.iter().any(|p| self.completed.contains(p))
            }
        }
    }

    /// Record that `node` has just been handed to the scheduler. For
    /// `"any"`-join nodes this must be called before awaiting the node's
    /// execution, so a second predecessor completing concurrently does not
    /// re-trigger it.
    pub fn mark_scheduled(&mut self, node: &NodeId) {
        if let Some(def) = self.blueprint.node(node) {
            if def.join_strategy() == JoinStrategy::Any {
                self.any_triggered.insert(node.clone());
            }
        }
    }

    /// Record a successful completion.
    pub fn mark_completed(&mut self, node: NodeId) {
        self.completed.insert(node);
    }

    /// Record a cancellation (an `"any"`-join loser, or a poisoned
    /// successor of a failed predecessor).
    pub fn mark_cancelled(&mut self, node: NodeId) {
        self.cancelled.insert(node);
    }

    /// Splice dynamically produced nodes and edges into the running
    /// blueprint and recompute structural facts (`spec.md` §4.5, "Dynamic
    /// nodes").
    pub fn inject_dynamic(
        &mut self,
        nodes: Vec<NodeDefinition>,
        edges: Vec<EdgeDefinition>,
    ) -> Result<(), EngineError> {
        if nodes.is_empty() && edges.is_empty() {
            return Ok(());
        }
        self.blueprint.nodes.extend(nodes);
        self.blueprint.edges.extend(edges);
        self.analysis = BlueprintAnalysis::compute(&self.blueprint)?;
        Ok(())
    }

    /// Apply the edge taxonomy of `spec.md` §4.4: among `source`'s outgoing
    /// edges whose `action` matches `output.action` (or has no `action`
    /// constraint), keep those that are explicitly routed — an `action`
    /// match or a truthy `condition`. If none fire, fall back to a plain
    /// unconditional edge (no `action`, no `condition`) as the default.
    #[must_use]
    pub fn determine_next_nodes<'a>(
        &'a self,
        source: &NodeId,
        output: &StrategyOutput,
        evaluator: &Evaluator,
        eval_scope: &Value,
    ) -> Vec<&'a EdgeDefinition> {
        let candidates: Vec<&EdgeDefinition> = self
            .blueprint
            .outgoing_edges(source)
            .filter(|e| e.action.is_none() || e.action.as_deref() == output.action.as_deref())
            .collect();

        let explicit: Vec<&EdgeDefinition> = candidates
            .iter()
            .copied()
            .filter(|e| !e.is_unconditional())
            .filter(|e| match &e.condition {
                Some(expr) => truthy(&evaluator.evaluate(expr, eval_scope)),
                None => true,
            })
            .collect();

        if !explicit.is_empty() {
            return explicit;
        }

        candidates.into_iter().filter(|e| e.is_unconditional()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcraft_blueprint::NodeConfig;

    fn linear() -> Blueprint {
        Blueprint::new("bp")
            .with_node(NodeDefinition::new("a", "function"))
            .with_node(NodeDefinition::new("b", "function"))
            .with_edge(EdgeDefinition::new("a", "b"))
    }

    #[test]
    fn start_node_is_ready_with_nothing_completed() {
        let traverser = Traverser::new(linear()).unwrap();
        let ready = traverser.ready_nodes(&HashSet::new());
        assert_eq!(ready, vec![NodeId::from("a")]);
    }

    #[test]
    fn successor_becomes_ready_once_predecessor_completes() {
        let mut traverser = Traverser::new(linear()).unwrap();
        traverser.mark_completed(NodeId::from("a"));
        let ready = traverser.ready_nodes(&HashSet::new());
        assert_eq!(ready, vec![NodeId::from("b")]);
    }

    #[test]
    fn all_join_waits_for_every_predecessor() {
        let bp = Blueprint::new("bp")
            .with_node(NodeDefinition::new("a", "function"))
            .with_node(NodeDefinition::new("b", "function"))
            .with_node(NodeDefinition::new("c", "function"))
            .with_edge(EdgeDefinition::new("a", "c"))
            .with_edge(EdgeDefinition::new("b", "c"));
        let mut traverser = Traverser::new(bp).unwrap();
        traverser.mark_completed(NodeId::from("a"));
        assert!(!traverser.ready_nodes(&HashSet::new()).contains(&NodeId::from("c")));
        traverser.mark_completed(NodeId::from("b"));
        assert!(traverser.ready_nodes(&HashSet::new()).contains(&NodeId::from("c")));
    }

    #[test]
    fn any_join_fires_once_then_is_never_ready_again() {
        let mut c = NodeDefinition::new("c", "function");
        c.config = Some(NodeConfig { join_strategy: JoinStrategy::Any, ..Default::default() });
        let bp = Blueprint::new("bp")
            .with_node(NodeDefinition::new("a", "function"))
            .with_node(NodeDefinition::new("b", "function"))
            .with_node(c)
            .with_edge(EdgeDefinition::new("a", "c"))
            .with_edge(EdgeDefinition::new("b", "c"));
        let mut traverser = Traverser::new(bp).unwrap();
        traverser.mark_completed(NodeId::from("a"));
        assert!(traverser.ready_nodes(&HashSet::new()).contains(&NodeId::from("c")));
        traverser.mark_scheduled(&NodeId::from("c"));
        traverser.mark_completed(NodeId::from("b"));
        assert!(!traverser.ready_nodes(&HashSet::new()).contains(&NodeId::from("c")));
    }

    #[test]
    fn dynamic_injection_extends_the_ready_computation() {
        let mut traverser = Traverser::new(linear()).unwrap();
        traverser.mark_completed(NodeId::from("a"));
        traverser.mark_completed(NodeId::from("b"));
        assert!(traverser.ready_nodes(&HashSet::new()).is_empty());
        traverser
            .inject_dynamic(
                vec![NodeDefinition::new("c", "function")],
                vec![EdgeDefinition::new("b", "c")],
            )
            .unwrap();
        assert_eq!(traverser.ready_nodes(&HashSet::new()), vec![NodeId::from("c")]);
    }

    #[test]
    fn conditional_edge_fires_only_when_truthy() {
        let bp = Blueprint::new("bp")
            .with_node(NodeDefinition::new("start", "function"))
            .with_node(NodeDefinition::new("a", "function"))
            .with_node(NodeDefinition::new("default", "function"))
            .with_edge({
                let mut e = EdgeDefinition::new("start", "a");
                e.condition = Some("result.ok".into());
                e
            })
            .with_edge(EdgeDefinition::new("start", "default"));
        let traverser = Traverser::new(bp).unwrap();
        let evaluator = Evaluator::sandboxed();

        let truthy_output = StrategyOutput::new(serde_json::json!({"ok": true}));
        let scope = serde_json::json!({"result": {"ok": true}});
        let fired = traverser.determine_next_nodes(&NodeId::from("start"), &truthy_output, &evaluator, &scope);
        assert_eq!(fired.iter().map(|e| e.target.as_str()).collect::<Vec<_>>(), vec!["a"]);

        let falsy_scope = serde_json::json!({"result": {"ok": false}});
        let fired = traverser.determine_next_nodes(&NodeId::from("start"), &truthy_output, &evaluator, &falsy_scope);
        assert_eq!(fired.iter().map(|e| e.target.as_str()).collect::<Vec<_>>(), vec!["default"]);
    }

    #[test]
    fn conditional_routing_picks_the_sole_truthy_branch_over_the_default() {
        let bp = Blueprint::new("bp")
            .with_node(NodeDefinition::new("start", "function"))
            .with_node(NodeDefinition::new("a", "function"))
            .with_node(NodeDefinition::new("b", "function"))
            .with_node(NodeDefinition::new("default", "function"))
            .with_edge({
                let mut e = EdgeDefinition::new("start", "a");
                e.condition = Some("result.user.role === 'admin'".into());
                e
            })
            .with_edge({
                let mut e = EdgeDefinition::new("start", "b");
                e.condition = Some("result.value <= 10".into());
                e
            })
            .with_edge(EdgeDefinition::new("start", "default"));
        let traverser = Traverser::new(bp).unwrap();
        let evaluator = Evaluator::sandboxed();
        let output = StrategyOutput::new(serde_json::json!({"value": 15, "user": {"role": "admin"}}));
        let scope = serde_json::json!({"result": {"value": 15, "user": {"role": "admin"}}});

        let fired = traverser.determine_next_nodes(&NodeId::from("start"), &output, &evaluator, &scope);
        assert_eq!(fired.iter().map(|e| e.target.as_str()).collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn action_tagged_edge_requires_a_matching_action() {
        let bp = Blueprint::new("bp")
            .with_node(NodeDefinition::new("start", "function"))
            .with_node(NodeDefinition::new("approved", "function"))
            .with_node(NodeDefinition::new("rejected", "function"))
            .with_edge({
                let mut e = EdgeDefinition::new("start", "approved");
                e.action = Some("approve".into());
                e
            })
            .with_edge({
                let mut e = EdgeDefinition::new("start", "rejected");
                e.action = Some("reject".into());
                e
            });
        let traverser = Traverser::new(bp).unwrap();
        let evaluator = Evaluator::default();
        let output = StrategyOutput::new(Value::Null).with_action("reject");
        let fired = traverser.determine_next_nodes(&NodeId::from("start"), &output, &evaluator, &Value::Null);
        assert_eq!(fired.iter().map(|e| e.target.as_str()).collect::<Vec<_>>(), vec!["rejected"]);
    }
}
