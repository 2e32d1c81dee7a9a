//! Intermediate records: the shape a row takes after a rule and before the graph.

use rowgraph_core::{Direction, EndpointRef, Properties};

/// A would-be node: its label and the properties copied from the row.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub label: String,
    pub properties: Properties,
}

/// A would-be relationship between two nodes identified by key fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRecord {
    pub rel_type: String,
    pub direction: Direction,
    pub source: EndpointRef,
    pub target: EndpointRef,
    pub properties: Properties,
}

/// Output of applying a rule to a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Node(NodeRecord),
    Relationship(RelationshipRecord),
}

impl Record {
    /// Node label or relationship type.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Node(node) => &node.label,
            Self::Relationship(rel) => &rel.rel_type,
        }
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self, Self::Relationship(_))
    }
}
