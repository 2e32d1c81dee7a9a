//! Rule model and row application.

use std::collections::BTreeMap;

use rowgraph_core::{Direction, EndpointRef, Properties, Row, Value};

use crate::record::{NodeRecord, Record, RelationshipRecord};

/// Where a rule reads its input rows from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// Rows of the named table from the whole-table dump.
    Table(String),
    /// Result rows of a literal query executed by the source adapter.
    Query(String),
    /// Nodes already persisted in the graph sink.
    Graph,
}

/// How a relationship rule locates one endpoint from a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMapping {
    /// Label of the endpoint node.
    pub label: String,
    /// Row column holding the endpoint's key value.
    pub key_column: String,
    /// Node property the key value is matched against.
    pub match_field: String,
}

impl EndpointMapping {
    pub fn new(
        label: impl Into<String>,
        key_column: impl Into<String>,
        match_field: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            key_column: key_column.into(),
            match_field: match_field.into(),
        }
    }

    fn resolve(&self, row: &Row) -> EndpointRef {
        EndpointRef {
            label: self.label.clone(),
            key: row.get(&self.key_column).cloned().unwrap_or(Value::Null),
            field: self.match_field.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRule {
    pub label: String,
    pub source: RuleSource,
    /// Source column to node property.
    pub field_mappings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRule {
    pub rel_type: String,
    pub direction: Direction,
    pub source: RuleSource,
    pub source_node: EndpointMapping,
    pub target_node: EndpointMapping,
    /// Source column to relationship property, copied first.
    pub field_mappings: BTreeMap<String, String>,
    /// Source column to relationship property, copied last (wins on clashes).
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    Node(NodeRule),
    Relationship(RelationshipRule),
}

/// One named projection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    /// Advisory unless the engine is configured to order by priority.
    pub priority: i32,
    pub kind: RuleKind,
}

impl Rule {
    pub fn node(name: impl Into<String>, rule: NodeRule) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            kind: RuleKind::Node(rule),
        }
    }

    pub fn relationship(name: impl Into<String>, rule: RelationshipRule) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            kind: RuleKind::Relationship(rule),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn source(&self) -> &RuleSource {
        match &self.kind {
            RuleKind::Node(rule) => &rule.source,
            RuleKind::Relationship(rule) => &rule.source,
        }
    }

    /// Node label or relationship type this rule produces.
    pub fn target_type(&self) -> &str {
        match &self.kind {
            RuleKind::Node(rule) => &rule.label,
            RuleKind::Relationship(rule) => &rule.rel_type,
        }
    }

    /// Relationship rule that runs over sink-resident nodes.
    pub fn is_graph_sourced(&self) -> bool {
        matches!(
            &self.kind,
            RuleKind::Relationship(RelationshipRule {
                source: RuleSource::Graph,
                ..
            })
        )
    }

    /// Endpoint labels of a relationship rule; empty for node rules.
    pub fn endpoint_labels(&self) -> Vec<&str> {
        match &self.kind {
            RuleKind::Node(_) => Vec::new(),
            RuleKind::Relationship(rule) => {
                vec![rule.source_node.label.as_str(), rule.target_node.label.as_str()]
            }
        }
    }

    /// Apply to one row. `None` means the row did not match: for a node rule,
    /// none of its mapped columns is present.
    pub fn apply(&self, row: &Row) -> Option<Record> {
        match &self.kind {
            RuleKind::Node(rule) => {
                let properties = copy_columns(row, &rule.field_mappings);
                if properties.is_empty() {
                    return None;
                }
                Some(Record::Node(NodeRecord {
                    label: rule.label.clone(),
                    properties,
                }))
            }
            RuleKind::Relationship(rule) => {
                let mut properties = copy_columns(row, &rule.field_mappings);
                properties.extend(copy_columns(row, &rule.properties));
                Some(Record::Relationship(RelationshipRecord {
                    rel_type: rule.rel_type.clone(),
                    direction: rule.direction,
                    source: rule.source_node.resolve(row),
                    target: rule.target_node.resolve(row),
                    properties,
                }))
            }
        }
    }

    /// Apply to a sequence of rows lazily, dropping rows that did not match.
    pub fn apply_all<'a, I>(&'a self, rows: I) -> impl Iterator<Item = Record> + 'a
    where
        I: IntoIterator<Item = &'a Row>,
        I::IntoIter: 'a,
    {
        rows.into_iter().filter_map(move |row| self.apply(row))
    }
}

/// Copy every mapped column present in the row; absent columns are skipped.
fn copy_columns(row: &Row, mappings: &BTreeMap<String, String>) -> Properties {
    mappings
        .iter()
        .filter_map(|(column, property)| {
            row.get(column)
                .map(|value| (property.clone(), value.clone()))
        })
        .collect()
}
