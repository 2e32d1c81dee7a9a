//! Graph sinks: where projected graphs are persisted and read back from.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use rowgraph_core::{CancellationToken, Error, Properties, Result, Row, Value};
use rowgraph_graph::{GraphAggregate, GraphSnapshot, RelationshipSnapshot};
use serde::Serialize;
use tracing::{debug, warn};

/// Outcome of one `store_graph` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreReport {
    #[serde(rename = "nodesWritten")]
    pub nodes_written: usize,
    #[serde(rename = "relationshipsWritten")]
    pub relationships_written: usize,
    /// Relationships dropped because an endpoint id was not found.
    #[serde(rename = "relationshipsSkipped")]
    pub relationships_skipped: usize,
}

/// Trait for property-graph stores.
pub trait GraphSink: Send + Sync {
    /// Persisted nodes of `label` as flat rows holding `id`, `type` and
    /// every stored property.
    fn fetch_nodes(&self, label: &str, cancel: &CancellationToken) -> Result<Vec<Row>>;

    /// Persist every node (create or merge by `(label, id)`), then every
    /// relationship whose endpoint ids exist; others are logged and skipped.
    fn store_graph(&self, graph: &GraphAggregate, cancel: &CancellationToken)
        -> Result<StoreReport>;
}

/// Flatten a stored node into the row shape `fetch_nodes` returns.
pub fn node_row(label: &str, id: &str, properties: &Properties) -> Row {
    let mut columns = properties.clone();
    columns.insert("id".to_string(), Value::Text(id.to_string()));
    columns.insert("type".to_string(), Value::Text(label.to_string()));
    Row::from_columns(None, columns)
}

#[derive(Default)]
struct MemoryGraphState {
    /// `(label, id)` to properties; values merge across stores.
    nodes: BTreeMap<(String, String), Properties>,
    /// Insertion order of `nodes` keys.
    order: Vec<(String, String)>,
    relationships: Vec<RelationshipSnapshot>,
    stored: Vec<GraphSnapshot>,
}

/// In-memory graph sink. Keeps every persisted element and a snapshot of
/// each aggregate it was asked to store.
#[derive(Default)]
pub struct MemoryGraphSink {
    state: Mutex<MemoryGraphState>,
    unavailable: Option<String>,
}

impl MemoryGraphSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call fails with `SinkUnavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Pre-populate a node as if persisted by an earlier run.
    pub fn with_node(self, label: &str, properties: Properties) -> Self {
        let id = properties
            .get("id")
            .map(|v| v.to_string())
            .unwrap_or_default();
        self.upsert(label, &id, properties);
        self
    }

    /// Snapshots of every aggregate passed to `store_graph`, in call order.
    pub fn stored(&self) -> Vec<GraphSnapshot> {
        self.state.lock().stored.clone()
    }

    pub fn store_count(&self) -> usize {
        self.state.lock().stored.len()
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn relationships(&self) -> Vec<RelationshipSnapshot> {
        self.state.lock().relationships.clone()
    }

    fn upsert(&self, label: &str, id: &str, properties: Properties) {
        let mut state = self.state.lock();
        let key = (label.to_string(), id.to_string());
        if !state.nodes.contains_key(&key) {
            state.order.push(key.clone());
        }
        state.nodes.entry(key).or_default().extend(properties);
    }

    fn check_available(&self) -> Result<()> {
        match &self.unavailable {
            Some(reason) => Err(Error::SinkUnavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl GraphSink for MemoryGraphSink {
    fn fetch_nodes(&self, label: &str, cancel: &CancellationToken) -> Result<Vec<Row>> {
        self.check_available()?;
        cancel.check()?;
        let state = self.state.lock();
        Ok(state
            .order
            .iter()
            .filter(|(node_label, _)| node_label == label)
            .filter_map(|key| {
                state
                    .nodes
                    .get(key)
                    .map(|properties| node_row(&key.0, &key.1, properties))
            })
            .collect())
    }

    fn store_graph(
        &self,
        graph: &GraphAggregate,
        cancel: &CancellationToken,
    ) -> Result<StoreReport> {
        self.check_available()?;
        let snapshot = graph.snapshot();
        let mut report = StoreReport::default();

        for node in &snapshot.nodes {
            cancel.check()?;
            self.upsert(&node.label, &node.id, node.properties.clone());
            report.nodes_written += 1;
        }

        let mut state = self.state.lock();
        for rel in &snapshot.relationships {
            cancel.check()?;
            let source = (rel.source_label.clone(), rel.source_id.clone());
            let target = (rel.target_label.clone(), rel.target_id.clone());
            if !state.nodes.contains_key(&source) || !state.nodes.contains_key(&target) {
                warn!(
                    "Skipping {} relationship: endpoint {}:{} or {}:{} not found",
                    rel.rel_type, source.0, source.1, target.0, target.1
                );
                report.relationships_skipped += 1;
                continue;
            }
            state.relationships.push(rel.clone());
            report.relationships_written += 1;
        }
        state.stored.push(snapshot);

        debug!(
            "MemoryGraphSink stored {} nodes, {} relationships",
            report.nodes_written, report.relationships_written
        );
        Ok(report)
    }
}
