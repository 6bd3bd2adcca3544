//! Static blueprint analysis (`spec.md` §4.1).
//!
//! Computed once per blueprint and cached by the caller (the Runtime
//! façade computes it exactly once per run — `spec.md` §4.6).

use std::collections::{HashMap, HashSet};

use flowcraft_core::ids::NodeId;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::BlueprintError;
use crate::model::Blueprint;

/// Cached structural facts about a blueprint's graph shape.
#[derive(Debug, Clone)]
pub struct BlueprintAnalysis {
    /// Nodes with zero in-edges.
    pub start_node_ids: Vec<NodeId>,
    /// Nodes with zero out-edges.
    pub terminal_node_ids: Vec<NodeId>,
    /// `nodeId -> set of direct predecessor ids`.
    pub predecessors: HashMap<NodeId, HashSet<NodeId>>,
    /// `nodeId -> set of direct successor ids`.
    pub successors: HashMap<NodeId, HashSet<NodeId>>,
    /// Whether the graph contains a cycle. Cycles are permitted; the
    /// traverser de-duplicates re-entry via its `completed` set.
    pub has_cycle: bool,
}

impl BlueprintAnalysis {
    /// Compute analysis for a blueprint, validating that every edge
    /// references a node that exists and that node ids are unique.
    pub fn compute(blueprint: &Blueprint) -> Result<Self, BlueprintError> {
        if blueprint.nodes.is_empty() {
            return Err(BlueprintError::Empty);
        }

        let mut seen = HashSet::new();
        for node in &blueprint.nodes {
            if !seen.insert(node.id.clone()) {
                return Err(BlueprintError::DuplicateNode(node.id.clone()));
            }
        }

        let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
        let mut index_of: HashMap<NodeId, NodeIndex> = HashMap::new();
        for node in &blueprint.nodes {
            let idx = graph.add_node(node.id.clone());
            index_of.insert(node.id.clone(), idx);
        }

        let mut predecessors: HashMap<NodeId, HashSet<NodeId>> = blueprint
            .nodes
            .iter()
            .map(|n| (n.id.clone(), HashSet::new()))
            .collect();
        let mut successors: HashMap<NodeId, HashSet<NodeId>> = predecessors
            .keys()
            .map(|id| (id.clone(), HashSet::new()))
            .collect();

        for edge in &blueprint.edges {
            let &src_idx = index_of
                .get(&edge.source)
                .ok_or_else(|| BlueprintError::UnknownNode(edge.source.clone()))?;
            let &tgt_idx = index_of
                .get(&edge.target)
                .ok_or_else(|| BlueprintError::UnknownNode(edge.target.clone()))?;
            graph.add_edge(src_idx, tgt_idx, ());
            successors.get_mut(&edge.source).unwrap().insert(edge.target.clone());
            predecessors.get_mut(&edge.target).unwrap().insert(edge.source.clone());
        }

        let start_node_ids = blueprint
            .nodes
            .iter()
            .map(|n| &n.id)
            .filter(|id| predecessors.get(*id).map(HashSet::is_empty).unwrap_or(true))
            .cloned()
            .collect();
        let terminal_node_ids = blueprint
            .nodes
            .iter()
            .map(|n| &n.id)
            .filter(|id| successors.get(*id).map(HashSet::is_empty).unwrap_or(true))
            .cloned()
            .collect();

        Ok(Self {
            start_node_ids,
            terminal_node_ids,
            predecessors,
            successors,
            has_cycle: is_cyclic_directed(&graph),
        })
    }

    /// Direct predecessors of a node (empty set if unknown or a start node).
    #[must_use]
    pub fn predecessors_of(&self, node: &NodeId) -> &HashSet<NodeId> {
        static EMPTY: std::sync::OnceLock<HashSet<NodeId>> = std::sync::OnceLock::new();
        self.predecessors
            .get(node)
            .unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }

    /// Direct successors of a node (empty set if unknown or a terminal node).
    #[must_use]
    pub fn successors_of(&self, node: &NodeId) -> &HashSet<NodeId> {
        static EMPTY: std::sync::OnceLock<HashSet<NodeId>> = std::sync::OnceLock::new();
        self.successors
            .get(node)
            .unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }

    /// Whether every predecessor of `node` is present in `completed`
    /// (`spec.md` §8, invariant 3 — `"all"`-join readiness).
    #[must_use]
    pub fn all_predecessors_completed(&self, node: &NodeId, completed: &HashSet<NodeId>) -> bool {
        self.predecessors_of(node).iter().all(|p| completed.contains(p))
    }
}
