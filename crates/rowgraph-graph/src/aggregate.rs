//! In-memory labeled property graph built during one projection run.
//!
//! Nodes live in a petgraph arena and are addressed by `NodeIndex`; the
//! arena never removes, so index order is insertion order. Identity is
//! `(label, id)`: re-adding a node merges its properties into the existing
//! one. Relationship endpoints are resolved through a secondary
//! `(label, field) -> value -> node` index built on first use.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use rowgraph_core::{Direction, EndpointRef, EndpointSide, Error, Properties, Result, Value};
use tracing::debug;

use crate::normalize::Normalizer;
use crate::types::*;

type FieldIndex = HashMap<String, NodeIndex>;

pub struct GraphAggregate {
    graph: DiGraph<GraphNode, GraphRelationship>,
    normalizer: Normalizer,
    /// `(label, id)` to node.
    identity: HashMap<(String, String), NodeIndex>,
    /// Nodes per label, in insertion order.
    members: HashMap<String, Vec<NodeIndex>>,
    /// `(label, field)` to first node per lookup key. Built lazily.
    field_index: HashMap<(String, String), FieldIndex>,
}

impl GraphAggregate {
    pub fn new() -> Self {
        Self::with_normalizer(Normalizer::default())
    }

    pub fn with_normalizer(normalizer: Normalizer) -> Self {
        Self {
            graph: DiGraph::new(),
            normalizer,
            identity: HashMap::new(),
            members: HashMap::new(),
            field_index: HashMap::new(),
        }
    }

    /// Insert a node, or merge into the node with the same `(label, id)`.
    ///
    /// Properties are normalized first; `id` must then be present and
    /// non-empty. On merge, new values overwrite existing ones.
    pub fn add_node(&mut self, label: &str, properties: Properties) -> Result<NodeIndex> {
        if label.trim().is_empty() {
            return Err(Error::InvalidRecord("node label is empty".into()));
        }

        let mut properties = self.normalizer.normalize_properties(properties);
        let id = properties
            .get("id")
            .and_then(identity_text)
            .ok_or_else(|| Error::MissingIdentity {
                label: label.to_string(),
                field: "id".to_string(),
            })?;
        properties.insert("id".to_string(), Value::Text(id.clone()));

        let key = (label.to_string(), id);
        if let Some(&idx) = self.identity.get(&key) {
            self.merge(idx, properties);
            return Ok(idx);
        }

        let (label, id) = key.clone();
        let idx = self.graph.add_node(GraphNode {
            label: label.clone(),
            id,
            properties,
        });
        self.identity.insert(key, idx);
        self.members.entry(label).or_default().push(idx);
        self.index_new_node(idx);
        Ok(idx)
    }

    /// Insert a relationship between two nodes already in the aggregate.
    ///
    /// Each endpoint resolves to the first node (in insertion order) with the
    /// endpoint's label whose `field` equals the normalized key. Source and
    /// target may resolve to the same node.
    pub fn add_relationship(
        &mut self,
        rel_type: &str,
        direction: Direction,
        source: &EndpointRef,
        target: &EndpointRef,
        properties: Properties,
    ) -> Result<EdgeIndex> {
        if rel_type.trim().is_empty() {
            return Err(Error::InvalidRecord("relationship type is empty".into()));
        }

        let source_idx = self
            .resolve(source)
            .ok_or_else(|| unresolved(rel_type, EndpointSide::Source, source))?;
        let target_idx = self
            .resolve(target)
            .ok_or_else(|| unresolved(rel_type, EndpointSide::Target, target))?;

        let properties = self.normalizer.normalize_properties(properties);
        Ok(self.graph.add_edge(
            source_idx,
            target_idx,
            GraphRelationship {
                rel_type: rel_type.to_string(),
                direction,
                properties,
            },
        ))
    }

    /// Nodes in first-insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.graph.node_weights()
    }

    /// Relationships in insertion order, with their endpoint nodes.
    pub fn relationships(&self) -> impl Iterator<Item = RelationshipView<'_>> + '_ {
        self.graph.edge_references().map(move |edge| RelationshipView {
            relationship: edge.weight(),
            source: &self.graph[edge.source()],
            target: &self.graph[edge.target()],
        })
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&GraphNode> {
        self.graph.node_weight(idx)
    }

    pub fn node_index(&self, label: &str, id: &str) -> Option<NodeIndex> {
        self.identity
            .get(&(label.to_string(), id.to_string()))
            .copied()
    }

    pub fn find_node(&self, label: &str, id: &str) -> Option<&GraphNode> {
        self.node_index(label, id).and_then(|idx| self.node(idx))
    }

    /// Endpoint node indices of a relationship.
    pub fn endpoints(&self, edge: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(edge)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.node_count(),
            relationship_count: self.relationship_count(),
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Owned copy with endpoints expressed as `(label, id)`.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes().cloned().collect(),
            relationships: self
                .relationships()
                .map(|view| RelationshipSnapshot {
                    rel_type: view.relationship.rel_type.clone(),
                    direction: view.relationship.direction,
                    source_label: view.source.label.clone(),
                    source_id: view.source.id.clone(),
                    target_label: view.target.label.clone(),
                    target_id: view.target.id.clone(),
                    properties: view.relationship.properties.clone(),
                })
                .collect(),
        }
    }

    fn merge(&mut self, idx: NodeIndex, properties: Properties) {
        let node = &mut self.graph[idx];
        let mut changed = Vec::new();
        for (key, value) in properties {
            if node.properties.get(&key) != Some(&value) {
                changed.push(key.clone());
                node.properties.insert(key, value);
            }
        }

        // A changed value may move the node in (or out of) a field index.
        let label = node.label.clone();
        for field in changed {
            if self.field_index.remove(&(label.clone(), field.clone())).is_some() {
                debug!("Invalidated field index {}.{}", label, field);
            }
        }
    }

    fn index_new_node(&mut self, idx: NodeIndex) {
        let node = &self.graph[idx];
        for ((label, field), entries) in self.field_index.iter_mut() {
            if *label != node.label {
                continue;
            }
            if let Some(key) = node.properties.get(field).and_then(lookup_key) {
                entries.entry(key).or_insert(idx);
            }
        }
    }

    fn resolve(&mut self, endpoint: &EndpointRef) -> Option<NodeIndex> {
        let key = self.normalizer.normalize(endpoint.key.clone());
        // Node ids are stored in their identity text form; match keys the same way.
        let key = if endpoint.field == "id" {
            Value::Text(identity_text(&key)?)
        } else {
            key
        };
        let key = lookup_key(&key)?;
        let entries = match self
            .field_index
            .entry((endpoint.label.clone(), endpoint.field.clone()))
        {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(build_field_index(
                &self.graph,
                self.members.get(&endpoint.label),
                &endpoint.field,
            )),
        };
        entries.get(&key).copied()
    }
}

impl Default for GraphAggregate {
    fn default() -> Self {
        Self::new()
    }
}

fn build_field_index(
    graph: &DiGraph<GraphNode, GraphRelationship>,
    members: Option<&Vec<NodeIndex>>,
    field: &str,
) -> FieldIndex {
    let mut entries = FieldIndex::new();
    for &idx in members.into_iter().flatten() {
        if let Some(key) = graph[idx].properties.get(field).and_then(lookup_key) {
            entries.entry(key).or_insert(idx);
        }
    }
    entries
}

/// Canonical comparison key for a normalized value; `null` never matches.
fn lookup_key(value: &Value) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some(value.to_json().to_string())
    }
}

fn identity_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(s) if s.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn unresolved(rel_type: &str, side: EndpointSide, endpoint: &EndpointRef) -> Error {
    Error::UnresolvedEndpoint {
        relationship: rel_type.to_string(),
        side,
        label: endpoint.label.clone(),
        field: endpoint.field.clone(),
        key: endpoint.key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn person(id: i64, name: &str) -> Properties {
        props(&[("id", Value::Int(id)), ("name", Value::from(name))])
    }

    #[test]
    fn test_add_node_normalizes_id() {
        let mut graph = GraphAggregate::new();
        graph.add_node("Person", person(1, "Ada")).unwrap();

        let node = graph.find_node("Person", "1").unwrap();
        assert_eq!(node.id, "1");
        assert_eq!(node.properties["id"], Value::from("1"));
        assert_eq!(node.properties["name"], Value::from("Ada"));
    }

    #[test]
    fn test_add_node_requires_id() {
        let mut graph = GraphAggregate::new();
        let missing = graph.add_node("Person", props(&[("name", Value::from("x"))]));
        assert!(matches!(missing, Err(Error::MissingIdentity { .. })));

        let empty = graph.add_node("Person", props(&[("id", Value::from(""))]));
        assert!(matches!(empty, Err(Error::MissingIdentity { .. })));

        let null = graph.add_node("Person", props(&[("id", Value::Null)]));
        assert!(matches!(null, Err(Error::MissingIdentity { .. })));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_empty_label_is_invalid_record() {
        let mut graph = GraphAggregate::new();
        assert!(matches!(
            graph.add_node("", person(1, "Ada")),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_duplicate_identity_merges_last_writer_wins() {
        let mut graph = GraphAggregate::new();
        let first = graph
            .add_node(
                "Person",
                props(&[
                    ("id", Value::Int(1)),
                    ("email", Value::from("old@x")),
                    ("age", Value::Int(30)),
                ]),
            )
            .unwrap();
        let second = graph
            .add_node("Person", props(&[("id", Value::Int(1)), ("email", Value::from("new@x"))]))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);
        let node = graph.find_node("Person", "1").unwrap();
        assert_eq!(node.properties["email"], Value::from("new@x"));
        assert_eq!(node.properties["age"], Value::from("30"));
    }

    #[test]
    fn test_same_id_different_labels_are_distinct() {
        let mut graph = GraphAggregate::new();
        graph.add_node("Person", person(1, "Ada")).unwrap();
        graph.add_node("Department", person(1, "R&D")).unwrap();
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_repeated_insert_is_idempotent() {
        let mut once = GraphAggregate::new();
        once.add_node("Person", person(1, "Ada")).unwrap();

        let mut twice = GraphAggregate::new();
        twice.add_node("Person", person(1, "Ada")).unwrap();
        twice.add_node("Person", person(1, "Ada")).unwrap();

        assert_eq!(once.snapshot(), twice.snapshot());
    }

    #[test]
    fn test_nodes_keep_insertion_order() {
        let mut graph = GraphAggregate::new();
        for (id, name) in [(3, "c"), (1, "a"), (2, "b")] {
            graph.add_node("Person", person(id, name)).unwrap();
        }
        graph.add_node("Person", person(3, "c2")).unwrap();
        let ids: Vec<&str> = graph.nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_relationship_resolves_integer_key_against_text_id() {
        let mut graph = GraphAggregate::new();
        graph.add_node("Person", person(1, "Ada")).unwrap();
        graph.add_node("Department", person(10, "R&D")).unwrap();

        graph
            .add_relationship(
                "WORKS_IN",
                Direction::Outgoing,
                &EndpointRef::new("Person", 1, "id"),
                &EndpointRef::new("Department", 10, "id"),
                props(&[("role", Value::from("engineer"))]),
            )
            .unwrap();

        let view = graph.relationships().next().unwrap();
        assert_eq!(view.relationship.rel_type, "WORKS_IN");
        assert_eq!(view.source.label, "Person");
        assert_eq!(view.target.id, "10");
        assert_eq!(view.relationship.properties["role"], Value::from("engineer"));
    }

    #[test]
    fn test_unresolved_endpoint() {
        let mut graph = GraphAggregate::new();
        graph.add_node("Person", person(1, "Ada")).unwrap();

        let err = graph
            .add_relationship(
                "WORKS_IN",
                Direction::Outgoing,
                &EndpointRef::new("Person", 1, "id"),
                &EndpointRef::new("Department", 99, "id"),
                Properties::new(),
            )
            .unwrap_err();
        match err {
            Error::UnresolvedEndpoint { side, label, key, .. } => {
                assert_eq!(side, EndpointSide::Target);
                assert_eq!(label, "Department");
                assert_eq!(key, "99");
            }
            other => panic!("expected UnresolvedEndpoint, got {:?}", other),
        }
        assert_eq!(graph.relationship_count(), 0);
    }

    #[test]
    fn test_null_key_never_resolves() {
        let mut graph = GraphAggregate::new();
        graph
            .add_node("Person", props(&[("id", Value::Int(1)), ("manager", Value::Null)]))
            .unwrap();
        let result = graph.add_relationship(
            "REPORTS_TO",
            Direction::Outgoing,
            &EndpointRef::new("Person", 1, "id"),
            &EndpointRef::new("Person", Value::Null, "manager"),
            Properties::new(),
        );
        assert!(matches!(result, Err(Error::UnresolvedEndpoint { .. })));
    }

    #[test]
    fn test_self_loop() {
        let mut graph = GraphAggregate::new();
        let idx = graph.add_node("Person", person(1, "Ada")).unwrap();
        let edge = graph
            .add_relationship(
                "KNOWS",
                Direction::Both,
                &EndpointRef::new("Person", "1", "id"),
                &EndpointRef::new("Person", "Ada", "name"),
                Properties::new(),
            )
            .unwrap();
        assert_eq!(graph.endpoints(edge), Some((idx, idx)));
    }

    #[test]
    fn test_match_on_non_id_field_takes_first_node() {
        let mut graph = GraphAggregate::new();
        graph
            .add_node("Person", props(&[("id", Value::Int(1)), ("team", Value::from("core"))]))
            .unwrap();
        graph
            .add_node("Person", props(&[("id", Value::Int(2)), ("team", Value::from("core"))]))
            .unwrap();
        graph.add_node("Team", props(&[("id", Value::from("core"))])).unwrap();

        graph
            .add_relationship(
                "LEADS",
                Direction::Outgoing,
                &EndpointRef::new("Person", "core", "team"),
                &EndpointRef::new("Team", "core", "id"),
                Properties::new(),
            )
            .unwrap();
        let view = graph.relationships().next().unwrap();
        assert_eq!(view.source.id, "1");
    }

    #[test]
    fn test_field_index_tracks_later_inserts_and_merges() {
        let mut graph = GraphAggregate::new();
        graph
            .add_node("Person", props(&[("id", Value::Int(1)), ("email", Value::from("a@x"))]))
            .unwrap();
        graph.add_node("Tag", props(&[("id", Value::from("t"))])).unwrap();

        let tag = EndpointRef::new("Tag", "t", "id");
        let by_email = |email: &str| EndpointRef::new("Person", email, "email");

        // Builds the (Person, email) index.
        graph
            .add_relationship(
                "TAGGED",
                Direction::Outgoing,
                &by_email("a@x"),
                &tag,
                Properties::new(),
            )
            .unwrap();

        // A node added after the build is visible.
        graph
            .add_node("Person", props(&[("id", Value::Int(2)), ("email", Value::from("b@x"))]))
            .unwrap();
        graph
            .add_relationship(
                "TAGGED",
                Direction::Outgoing,
                &by_email("b@x"),
                &tag,
                Properties::new(),
            )
            .unwrap();

        // A merge that changes the email moves the node in the index.
        graph
            .add_node("Person", props(&[("id", Value::Int(1)), ("email", Value::from("c@x"))]))
            .unwrap();
        assert!(graph
            .add_relationship(
                "TAGGED",
                Direction::Outgoing,
                &by_email("a@x"),
                &tag,
                Properties::new(),
            )
            .is_err());
        graph
            .add_relationship(
                "TAGGED",
                Direction::Outgoing,
                &by_email("c@x"),
                &tag,
                Properties::new(),
            )
            .unwrap();

        let sources: Vec<&str> = graph.relationships().map(|v| v.source.id.as_str()).collect();
        assert_eq!(sources, vec!["1", "2", "1"]);
    }

    #[test]
    fn test_properties_normalized_on_insert() {
        let mut graph = GraphAggregate::new();
        graph
            .add_node(
                "Doc",
                props(&[
                    ("id", Value::from("d1")),
                    ("meta", Value::from_json(serde_json::json!({"a": 1}))),
                    ("body", Value::from("z".repeat(10_001))),
                ]),
            )
            .unwrap();
        let node = graph.find_node("Doc", "d1").unwrap();
        assert_eq!(node.properties["meta"], Value::from(r#"{"a":1}"#));
        assert_eq!(node.properties["body"].as_str().unwrap().len(), 10_000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut graph = GraphAggregate::new();
        graph.add_node("Person", person(1, "Ada")).unwrap();
        graph
            .add_relationship(
                "KNOWS",
                Direction::Outgoing,
                &EndpointRef::new("Person", 1, "id"),
                &EndpointRef::new("Person", 1, "id"),
                Properties::new(),
            )
            .unwrap();

        let json = serde_json::to_value(graph.snapshot()).unwrap();
        assert_eq!(json["nodes"][0]["label"], "Person");
        assert_eq!(json["nodes"][0]["properties"]["id"], "1");
        assert_eq!(json["relationships"][0]["type"], "KNOWS");
        assert_eq!(json["relationships"][0]["sourceId"], "1");
        assert_eq!(graph.stats().relationship_count, 1);
    }

    #[test]
    fn test_float_and_bool_ids_resolve_by_same_value() {
        let mut graph = GraphAggregate::new();
        graph
            .add_node("Person", props(&[("id", Value::Float(1.0))]))
            .unwrap();
        graph
            .add_node("Flag", props(&[("id", Value::Bool(true))]))
            .unwrap();
        assert_eq!(graph.find_node("Person", "1").unwrap().id, "1");
        assert_eq!(graph.find_node("Flag", "true").unwrap().id, "true");

        graph
            .add_relationship(
                "RAISED",
                Direction::Outgoing,
                &EndpointRef::new("Person", 1.0, "id"),
                &EndpointRef::new("Flag", true, "id"),
                Properties::new(),
            )
            .unwrap();
        let view = graph.relationships().next().unwrap();
        assert_eq!(view.source.label, "Person");
        assert_eq!(view.target.label, "Flag");

        // The integer 1 and the text "1" name the same node as the float.
        graph
            .add_relationship(
                "SELF",
                Direction::Outgoing,
                &EndpointRef::new("Person", 1, "id"),
                &EndpointRef::new("Person", "1", "id"),
                Properties::new(),
            )
            .unwrap();
        assert_eq!(graph.relationship_count(), 2);
    }
}
