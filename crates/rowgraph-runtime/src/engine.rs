//! Transformation engine: one projection run from source rows to the sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rowgraph_core::{EngineConfig, Error, Properties, Result, Row, Value};
use rowgraph_graph::{GraphAggregate, NormalizationWarning, Normalizer};
use rowgraph_rules::{NodeRecord, Record, RelationshipRecord, Rule, RuleRepository, RuleSource};
use rowgraph_store::{GraphSink, SourceAdapter};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::types::*;

/// Everything gathered during Loading.
struct LoadedInput {
    table_rows: HashMap<String, Vec<Row>>,
    /// Sink-resident node rows, each carrying `id` and `type`.
    graph_rows: Vec<Row>,
}

/// Drives rules over a source adapter and flushes the result to a graph sink.
///
/// Runs are sequential: rules in order, each rule's records in order. One
/// engine may be reused for several runs; each run builds a fresh aggregate.
pub struct TransformationEngine {
    source: Arc<dyn SourceAdapter>,
    sink: Arc<dyn GraphSink>,
    rules: Arc<dyn RuleRepository>,
    config: EngineConfig,
    normalizer: Normalizer,
    state: Mutex<RunState>,
}

impl TransformationEngine {
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        sink: Arc<dyn GraphSink>,
        rules: Arc<dyn RuleRepository>,
        config: EngineConfig,
    ) -> Self {
        let normalizer = Normalizer::from_config(&config);
        info!(
            "TransformationEngine initialized: max_text_len={}, list_policy={:?}, \
             fatal_unresolved={}",
            config.max_text_len,
            config.list_policy,
            config.fatal_unresolved
        );
        Self {
            source,
            sink,
            rules,
            config,
            normalizer,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// State of the current run, or of the last one when idle between runs.
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Perform one run end-to-end: load, project, flush.
    pub fn transform_and_store(&self, ctx: &RunContext) -> Result<RunReport> {
        let start = Instant::now();
        let mut report = RunReport {
            run_id: ctx.run_id.clone(),
            ..RunReport::default()
        };
        info!("Run {} started", ctx.run_id);

        let result = self.project_into(ctx, &mut report).and_then(|graph| {
            self.set_state(RunState::Flushing);
            ctx.cancel.check()?;
            report.store = self.sink.store_graph(&graph, &ctx.cancel)?;
            Ok(())
        });
        self.finish(ctx, result, RunState::Done)?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Run {} complete: rules={}, records={}, nodes={}, relationships={}, skipped={}, \
             warnings={}, duration={}ms",
            report.run_id,
            report.rules_applied,
            report.records_projected,
            report.nodes,
            report.relationships,
            report.unresolved_skipped,
            report.warnings,
            report.duration_ms
        );
        Ok(report)
    }

    /// Load and project without flushing; returns the aggregate that
    /// `transform_and_store` would have persisted. Nothing is flushed, so a
    /// successful dry run leaves the engine `Idle`; a failed one `Failed`.
    pub fn project(&self, ctx: &RunContext) -> Result<GraphAggregate> {
        let mut report = RunReport {
            run_id: ctx.run_id.clone(),
            ..RunReport::default()
        };
        let result = self.project_into(ctx, &mut report);
        self.finish(ctx, result, RunState::Idle)
    }

    fn finish<T>(&self, ctx: &RunContext, result: Result<T>, done: RunState) -> Result<T> {
        match result {
            Ok(value) => {
                self.set_state(done);
                Ok(value)
            }
            Err(e) => {
                self.set_state(RunState::Failed);
                error!("Run {} failed: {}", ctx.run_id, e);
                Err(e)
            }
        }
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock() = state;
        debug!("Engine state: {:?}", state);
    }

    fn project_into(&self, ctx: &RunContext, report: &mut RunReport) -> Result<GraphAggregate> {
        self.set_state(RunState::Loading);
        ctx.cancel.check()?;
        let rule_set = self.rules.load()?;
        let rules = rule_set.ordered(self.config.order_by_priority);
        debug!("Loaded {} rules", rules.len());

        let input = self.load(&rules, ctx, report)?;

        self.set_state(RunState::Projecting);
        let mut graph = GraphAggregate::with_normalizer(self.normalizer);
        self.seed(&mut graph, &input.graph_rows)?;

        for rule in rules {
            ctx.cancel.check()?;
            self.apply_rule(rule, &input, &mut graph, ctx, report)?;
            report.rules_applied += 1;
        }

        report.nodes = graph.node_count();
        report.relationships = graph.relationship_count();
        Ok(graph)
    }

    fn load(
        &self,
        rules: &[&Rule],
        ctx: &RunContext,
        report: &mut RunReport,
    ) -> Result<LoadedInput> {
        ctx.cancel.check()?;
        let rows = self.source.fetch_all(&ctx.cancel)?;
        let fetched = rows.len();

        let mut table_rows: HashMap<String, Vec<Row>> = HashMap::new();
        for mut row in rows {
            self.stringify_maps(&mut row, report);
            match row.table() {
                Some(table) => table_rows.entry(table.to_string()).or_default().push(row),
                None => debug!("Dropping source row without a table tag"),
            }
        }
        debug!("Fetched {} rows from {} tables", fetched, table_rows.len());

        let mut labels: Vec<&str> = Vec::new();
        for rule in rules.iter().filter(|rule| rule.is_graph_sourced()) {
            for label in rule.endpoint_labels() {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }

        let mut graph_rows = Vec::new();
        for label in labels {
            ctx.cancel.check()?;
            let nodes = self.sink.fetch_nodes(label, &ctx.cancel)?;
            debug!("Pre-loaded {} {} nodes from sink", nodes.len(), label);
            graph_rows.extend(nodes);
        }

        Ok(LoadedInput {
            table_rows,
            graph_rows,
        })
    }

    /// Turn nested mappings into JSON text before any rule can copy them.
    fn stringify_maps(&self, row: &mut Row, report: &mut RunReport) {
        let mut warnings = Vec::new();
        for value in row.columns_mut().values_mut() {
            if matches!(value, Value::Map(_)) {
                let map = std::mem::replace(value, Value::Null);
                *value = self.normalizer.coerce(map, &mut warnings);
            }
        }
        self.record_warnings("source row", &warnings, report);
    }

    /// Normalize every column of a row, keeping its table tag.
    fn normalize_row(&self, row: &Row, report: &mut RunReport) -> Row {
        let mut warnings = Vec::new();
        let columns = self
            .normalizer
            .coerce_properties(row.columns().clone(), &mut warnings);
        self.record_warnings("source row", &warnings, report);
        Row::from_columns(row.table().map(str::to_string), columns)
    }

    /// Materialize sink-resident nodes so graph-sourced rules can resolve them.
    fn seed(&self, graph: &mut GraphAggregate, rows: &[Row]) -> Result<()> {
        for row in rows {
            let mut properties = row.columns().clone();
            let label = match properties.remove("type") {
                Some(Value::Text(label)) => label,
                _ => {
                    return Err(Error::InvalidRecord(
                        "sink node row has no text 'type'".into(),
                    ))
                }
            };
            graph.add_node(&label, properties)?;
        }
        if !rows.is_empty() {
            debug!("Seeded {} nodes from sink", rows.len());
        }
        Ok(())
    }

    fn apply_rule(
        &self,
        rule: &Rule,
        input: &LoadedInput,
        graph: &mut GraphAggregate,
        ctx: &RunContext,
        report: &mut RunReport,
    ) -> Result<()> {
        let rows: Vec<Row> = match rule.source() {
            RuleSource::Graph => {
                // Only the source label's nodes: rows of other pre-loaded labels
                // would match ids of the wrong label or yield unresolved records.
                let label = rule.endpoint_labels().first().map(|l| l.to_string());
                input
                    .graph_rows
                    .iter()
                    .filter(|row| row.get("type").and_then(Value::as_str) == label.as_deref())
                    .cloned()
                    .collect()
            }
            RuleSource::Query(query) => {
                ctx.cancel.check()?;
                let rows = self.source.execute_query(query, &ctx.cancel)?;
                rows.iter().map(|row| self.normalize_row(row, report)).collect()
            }
            RuleSource::Table(table) => match input.table_rows.get(table) {
                Some(rows) => rows.iter().map(|row| self.normalize_row(row, report)).collect(),
                None => {
                    debug!("Rule {}: no rows for table {}", rule.name, table);
                    Vec::new()
                }
            },
        };

        let mut produced = 0;
        for record in rule.apply_all(&rows) {
            ctx.cancel.check()?;
            produced += 1;
            self.update_graph(rule, record, graph, report)?;
        }
        report.records_projected += produced;
        debug!(
            "Rule {} ({}): {} rows, {} records",
            rule.name,
            rule.target_type(),
            rows.len(),
            produced
        );
        Ok(())
    }

    fn update_graph(
        &self,
        rule: &Rule,
        record: Record,
        graph: &mut GraphAggregate,
        report: &mut RunReport,
    ) -> Result<()> {
        match record {
            Record::Node(NodeRecord { label, properties }) => {
                let properties = self.ensure_identity(&label, properties)?;
                let mut warnings = Vec::new();
                let properties = self.normalizer.coerce_properties(properties, &mut warnings);
                self.record_warnings(&label, &warnings, report);
                graph.add_node(&label, properties)?;
            }
            Record::Relationship(RelationshipRecord {
                rel_type,
                direction,
                source,
                target,
                properties,
            }) => {
                let mut warnings = Vec::new();
                let properties = self.normalizer.coerce_properties(properties, &mut warnings);
                self.record_warnings(&rel_type, &warnings, report);
                match graph.add_relationship(&rel_type, direction, &source, &target, properties) {
                    Ok(_) => {}
                    Err(e @ Error::UnresolvedEndpoint { .. }) if !self.config.fatal_unresolved => {
                        warn!("Rule {}: skipping relationship: {}", rule.name, e);
                        report.unresolved_skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Fill in `id` and `name` when absent, or refuse the record when
    /// identity defaults are off.
    fn ensure_identity(&self, label: &str, mut properties: Properties) -> Result<Properties> {
        let missing_id = match properties.get("id") {
            None | Some(Value::Null) => true,
            Some(Value::Text(id)) => id.is_empty(),
            Some(_) => false,
        };
        let missing_name = matches!(properties.get("name"), None | Some(Value::Null));

        if !self.config.inject_identity_defaults {
            let field = if missing_id {
                "id"
            } else if missing_name {
                "name"
            } else {
                return Ok(properties);
            };
            return Err(Error::MissingIdentity {
                label: label.to_string(),
                field: field.to_string(),
            });
        }

        if missing_id {
            let id = Uuid::new_v4().to_string();
            debug!("Assigned id {} to {} node", id, label);
            properties.insert("id".to_string(), Value::Text(id));
        }
        if missing_name {
            properties.insert(
                "name".to_string(),
                Value::Text(self.config.default_name.clone()),
            );
        }
        Ok(properties)
    }

    fn record_warnings(
        &self,
        context: &str,
        warnings: &[NormalizationWarning],
        report: &mut RunReport,
    ) {
        for warning in warnings {
            warn!("Normalization warning ({}): {}", context, warning);
        }
        report.warnings += warnings.len();
    }
}
