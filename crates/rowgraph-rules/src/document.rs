//! Rule-set documents.
//!
//! The text form is a JSON list of rule entries, or an object whose `rules`
//! field holds that list:
//!
//! ```json
//! [
//!   {"name": "users", "rule_type": "node",
//!    "source": {"type": "table", "value": "users"},
//!    "target_type": "Person",
//!    "field_mappings": {"id": "id", "name": "name"}},
//!   {"name": "works_in", "rule_type": "relationship",
//!    "source": {"type": "table", "value": "user_departments"},
//!    "relationship_type": "WORKS_IN", "direction": "outgoing",
//!    "source_node": {"type": "Person", "key": "user_id", "target_field": "id"},
//!    "target_node": {"type": "Department", "key": "dept_id", "target_field": "id"},
//!    "properties": {"role": "role"}}
//! ]
//! ```
//!
//! Entries are validated into typed [`Rule`]s on load; anything malformed
//! fails with `InvalidRule`.

use std::collections::BTreeMap;

use rowgraph_core::{Direction, Error, Result};
use serde::{Deserialize, Serialize};

use crate::rule::{EndpointMapping, NodeRule, RelationshipRule, Rule, RuleKind, RuleSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SourceEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EndpointEntry {
    #[serde(rename = "type")]
    label: String,
    key: String,
    target_field: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RuleEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    rule_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<SourceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    relationship_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    direction: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    field_mappings: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_node: Option<EndpointEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_node: Option<EndpointEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    priority: i32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentShape {
    List(Vec<RuleEntry>),
    Wrapped { rules: Vec<RuleEntry> },
}

/// Ordered collection of rules applied in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Parse and validate a JSON rule-set document.
    pub fn from_json(text: &str) -> Result<Self> {
        let entries = match serde_json::from_str::<DocumentShape>(text)? {
            DocumentShape::List(entries) => entries,
            DocumentShape::Wrapped { rules } => rules,
        };
        let rules = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| entry.into_rule(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Render back to the JSON list form.
    pub fn to_json(&self) -> Result<String> {
        let entries: Vec<RuleEntry> = self.rules.iter().map(RuleEntry::from_rule).collect();
        Ok(serde_json::to_string_pretty(&entries)?)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in application order: declaration order, or descending priority
    /// (ties keep declaration order) when `by_priority` is set.
    pub fn ordered(&self, by_priority: bool) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        if by_priority {
            rules.sort_by_key(|rule| std::cmp::Reverse(rule.priority));
        }
        rules
    }
}

impl RuleEntry {
    fn into_rule(self, index: usize) -> Result<Rule> {
        let name = if self.name.trim().is_empty() {
            format!("rule[{}]", index)
        } else {
            self.name.clone()
        };
        let invalid = |reason: String| Error::invalid_rule(name.clone(), reason);

        let source = match &self.source {
            None => None,
            Some(entry) => Some(parse_source(entry).map_err(&invalid)?),
        };

        let kind = match self.rule_type.trim().to_ascii_lowercase().as_str() {
            "node" => {
                let label = non_empty(self.target_type.as_deref())
                    .ok_or_else(|| invalid("node rule requires target_type".into()))?;
                let source = match source {
                    Some(RuleSource::Graph) => {
                        return Err(invalid("node rules cannot read from the graph".into()))
                    }
                    Some(source) => source,
                    None => return Err(invalid("node rule requires a source".into())),
                };
                RuleKind::Node(NodeRule {
                    label,
                    source,
                    field_mappings: self.field_mappings,
                })
            }
            "relationship" => {
                let rel_type = non_empty(self.relationship_type.as_deref())
                    .or_else(|| non_empty(self.target_type.as_deref()))
                    .ok_or_else(|| {
                        invalid("relationship rule requires relationship_type".into())
                    })?;
                let direction = match self.direction.as_deref() {
                    None => Direction::default(),
                    Some(raw) => raw.parse().map_err(&invalid)?,
                };
                let source_node = self
                    .source_node
                    .map(endpoint_mapping)
                    .ok_or_else(|| invalid("relationship rule requires source_node".into()))?;
                let target_node = self
                    .target_node
                    .map(endpoint_mapping)
                    .ok_or_else(|| invalid("relationship rule requires target_node".into()))?;
                RuleKind::Relationship(RelationshipRule {
                    rel_type,
                    direction,
                    source: source.unwrap_or(RuleSource::Graph),
                    source_node,
                    target_node,
                    field_mappings: self.field_mappings,
                    properties: self.properties,
                })
            }
            other => return Err(invalid(format!("unsupported rule_type '{}'", other))),
        };

        Ok(Rule {
            name,
            priority: self.priority,
            kind,
        })
    }

    fn from_rule(rule: &Rule) -> Self {
        let source = Some(match rule.source() {
            RuleSource::Table(table) => SourceEntry {
                kind: "table".into(),
                value: Some(table.clone()),
            },
            RuleSource::Query(query) => SourceEntry {
                kind: "query".into(),
                value: Some(query.clone()),
            },
            RuleSource::Graph => SourceEntry {
                kind: "graph".into(),
                value: None,
            },
        });

        match &rule.kind {
            RuleKind::Node(node) => Self {
                name: rule.name.clone(),
                rule_type: "node".into(),
                source,
                target_type: Some(node.label.clone()),
                field_mappings: node.field_mappings.clone(),
                priority: rule.priority,
                ..Default::default()
            },
            RuleKind::Relationship(rel) => Self {
                name: rule.name.clone(),
                rule_type: "relationship".into(),
                source,
                relationship_type: Some(rel.rel_type.clone()),
                direction: Some(rel.direction.to_string()),
                field_mappings: rel.field_mappings.clone(),
                source_node: Some(endpoint_entry(&rel.source_node)),
                target_node: Some(endpoint_entry(&rel.target_node)),
                properties: rel.properties.clone(),
                priority: rule.priority,
                ..Default::default()
            },
        }
    }
}

fn parse_source(entry: &SourceEntry) -> std::result::Result<RuleSource, String> {
    let value = non_empty(entry.value.as_deref());
    match entry.kind.trim().to_ascii_lowercase().as_str() {
        "table" => value
            .map(RuleSource::Table)
            .ok_or_else(|| "table source requires a value".to_string()),
        "query" => value
            .map(RuleSource::Query)
            .ok_or_else(|| "query source requires a value".to_string()),
        "graph" => Ok(RuleSource::Graph),
        other => Err(format!("unsupported source type '{}'", other)),
    }
}

fn endpoint_mapping(entry: EndpointEntry) -> EndpointMapping {
    EndpointMapping {
        label: entry.label,
        key_column: entry.key,
        match_field: entry.target_field,
    }
}

fn endpoint_entry(mapping: &EndpointMapping) -> EndpointEntry {
    EndpointEntry {
        label: mapping.label.clone(),
        key: mapping.key_column.clone(),
        target_field: mapping.match_field.clone(),
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
