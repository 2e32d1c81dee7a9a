//! Graph element types and serializable snapshots.

use rowgraph_core::{Direction, Properties};
use serde::{Deserialize, Serialize};

/// A node in the graph aggregate. `properties` always holds `id` as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub label: String,
    pub id: String,
    pub properties: Properties,
}

/// A resolved relationship; its endpoints live on the graph edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub direction: Direction,
    pub properties: Properties,
}

/// Borrowed view of a relationship together with its endpoint nodes.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipView<'a> {
    pub relationship: &'a GraphRelationship,
    pub source: &'a GraphNode,
    pub target: &'a GraphNode,
}

/// Flat, owned copy of an aggregate, endpoints referenced by `(label, id)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<RelationshipSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSnapshot {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub direction: Direction,
    #[serde(rename = "sourceLabel")]
    pub source_label: String,
    #[serde(rename = "sourceId")]
    pub source_id: String,
    #[serde(rename = "targetLabel")]
    pub target_label: String,
    #[serde(rename = "targetId")]
    pub target_id: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    #[serde(rename = "nodeCount")]
    pub node_count: usize,
    #[serde(rename = "relationshipCount")]
    pub relationship_count: usize,
}
