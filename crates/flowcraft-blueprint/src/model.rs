//! Blueprint, node, and edge data types (`spec.md` §3).

use std::collections::HashMap;
use std::time::Duration;

use flowcraft_core::ids::{BlueprintId, NodeId};
use serde::{Deserialize, Serialize};

/// Fan-in policy for a node with multiple predecessors (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStrategy {
    /// Every predecessor must complete before the node runs. Default.
    #[default]
    All,
    /// The first predecessor to complete triggers the node; the rest are cancelled.
    Any,
}

/// Per-node retry/timeout/fallback/join configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Maximum number of retry attempts after the first failed attempt.
    pub max_retries: Option<u32>,
    /// Per-attempt timeout. `Some(Duration::ZERO)` fires immediately (`spec.md` §8).
    #[serde(with = "duration_millis_opt")]
    pub timeout: Option<Duration>,
    /// Name of a registered function to invoke once retries are exhausted.
    pub fallback: Option<String>,
    /// Fan-in policy when this node has more than one predecessor.
    pub join_strategy: JoinStrategy,
}

/// How a node resolves its input (`spec.md` §3, "NodeDefinition").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeInputs {
    /// A single predecessor id (or literal context key).
    Single(String),
    /// An ordered list tried in turn; the first defined value wins.
    List(Vec<String>),
    /// A map from output alias to one or more source keys.
    Aliased(HashMap<String, AliasSource>),
}

/// The source(s) for one entry of an [`NodeInputs::Aliased`] map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AliasSource {
    /// A single source key.
    One(String),
    /// Several source keys tried in turn.
    Many(Vec<String>),
}

/// A single node in a blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique id of this node within its blueprint.
    pub id: NodeId,
    /// The executor strategy key this node dispatches to.
    pub uses: String,
    /// Strategy-specific parameters.
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    /// Retry/timeout/fallback/join configuration.
    #[serde(default)]
    pub config: Option<NodeConfig>,
    /// How to resolve this node's input.
    #[serde(default)]
    pub inputs: Option<NodeInputs>,
}

impl NodeDefinition {
    /// Construct a minimal node using the `function` strategy.
    pub fn new(id: impl Into<NodeId>, uses: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uses: uses.into(),
            params: None,
            config: None,
            inputs: None,
        }
    }

    /// Effective join strategy, defaulting to `"all"` when unconfigured.
    #[must_use]
    pub fn join_strategy(&self) -> JoinStrategy {
        self.config
            .as_ref()
            .map(|c| c.join_strategy)
            .unwrap_or_default()
    }

    /// Effective max retries, defaulting to zero (no retries).
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.config.as_ref().and_then(|c| c.max_retries).unwrap_or(0)
    }
}

/// An edge between two nodes, with optional routing predicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    /// Source node id.
    pub source: NodeId,
    /// Target node id.
    pub target: NodeId,
    /// Selects this edge only when the source result's `action` matches.
    #[serde(default)]
    pub action: Option<String>,
    /// Expression evaluated against `{result, context, input}`; fires only if truthy.
    #[serde(default)]
    pub condition: Option<String>,
    /// Expression producing the target's input from `{input, result, context}`.
    #[serde(default)]
    pub transform: Option<String>,
}

impl EdgeDefinition {
    /// Construct a plain, unconditional edge.
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            action: None,
            condition: None,
            transform: None,
        }
    }

    /// Whether this edge has neither an `action` nor a `condition` constraint
    /// (i.e. it is the default fallthrough edge of its source node).
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        self.action.is_none() && self.condition.is_none()
    }
}

/// Optional blueprint metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueprintMetadata {
    /// Semantic version of this blueprint, used for run-pinning (`spec.md` §4.7).
    pub version: Option<semver::Version>,
    /// Human-readable name.
    pub name: Option<String>,
    /// When this version of the blueprint was registered, if the store
    /// that produced it records one.
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// An immutable, compiled workflow graph definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    /// Stable id of this blueprint, shared across versions.
    pub id: BlueprintId,
    /// Optional metadata, including the version used for compatibility checks.
    #[serde(default)]
    pub metadata: Option<BlueprintMetadata>,
    /// The node set.
    pub nodes: Vec<NodeDefinition>,
    /// The edge set.
    pub edges: Vec<EdgeDefinition>,
    /// Type hints only; not validated at runtime.
    #[serde(default)]
    pub inputs: Option<serde_json::Value>,
    /// Type hints only; not validated at runtime.
    #[serde(default)]
    pub outputs: Option<serde_json::Value>,
}

impl Blueprint {
    /// Construct an empty blueprint with the given id.
    pub fn new(id: impl Into<BlueprintId>) -> Self {
        Self {
            id: id.into(),
            metadata: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            inputs: None,
            outputs: None,
        }
    }

    /// Append a node, builder-style.
    #[must_use]
    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append an edge, builder-style.
    #[must_use]
    pub fn with_edge(mut self, edge: EdgeDefinition) -> Self {
        self.edges.push(edge);
        self
    }

    /// The blueprint's pinned version, if any.
    #[must_use]
    pub fn version(&self) -> Option<&semver::Version> {
        self.metadata.as_ref().and_then(|m| m.version.as_ref())
    }

    /// Outgoing edges for a node, in declaration order (`spec.md` §4.4, "Edge taxonomy").
    #[must_use]
    pub fn outgoing_edges<'a, 'b>(&'a self, node: &'b NodeId) -> impl Iterator<Item = &'a EdgeDefinition> + use<'a, 'b> {
        self.edges.iter().filter(move |e| &e.source == node)
    }

    /// Look up a node definition by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| &n.id == id)
    }
}

mod duration_millis_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_default_join_strategy_is_all() {
        let node = NodeDefinition::new("a", "function");
        assert_eq!(node.join_strategy(), JoinStrategy::All);
    }

    #[test]
    fn node_default_max_retries_is_zero() {
        let node = NodeDefinition::new("a", "function");
        assert_eq!(node.max_retries(), 0);
    }

    #[test]
    fn unconditional_edge_has_no_action_or_condition() {
        let edge = EdgeDefinition::new("a", "b");
        assert!(edge.is_unconditional());
    }

    #[test]
    fn edge_with_condition_is_not_unconditional() {
        let mut edge = EdgeDefinition::new("a", "b");
        edge.condition = Some("result.ok".into());
        assert!(!edge.is_unconditional());
    }

    #[test]
    fn outgoing_edges_preserve_declaration_order() {
        let bp = Blueprint::new("bp")
            .with_node(NodeDefinition::new("start", "function"))
            .with_edge(EdgeDefinition::new("start", "a"))
            .with_edge(EdgeDefinition::new("start", "b"));
        let ids: Vec<_> = bp
            .outgoing_edges(&NodeId::from("start"))
            .map(|e| e.target.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn node_config_timeout_roundtrips_as_millis() {
        let cfg = NodeConfig {
            timeout: Some(Duration::from_millis(250)),
            ..Default::default()
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["timeout"], serde_json::json!(250));
        let back: NodeConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn blueprint_version_is_none_when_metadata_absent() {
        let bp = Blueprint::new("bp");
        assert!(bp.version().is_none());
    }
}
