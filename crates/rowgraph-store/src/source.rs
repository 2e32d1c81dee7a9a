//! Source adapters: where rows come from.

use std::collections::HashMap;

use rowgraph_core::{CancellationToken, Error, Result, Row};
use tracing::debug;

/// Trait for relational row sources.
///
/// Calls are blocking from the engine's point of view; implementations
/// should check `cancel` between units of work.
pub trait SourceAdapter: Send + Sync {
    /// Every row of every configured table, each tagged with its table.
    fn fetch_all(&self, cancel: &CancellationToken) -> Result<Vec<Row>>;

    /// Run a literal query verbatim. Result rows carry no table tag.
    fn execute_query(&self, query: &str, cancel: &CancellationToken) -> Result<Vec<Row>>;
}

/// In-memory source over fixed tables and canned query results.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: Vec<(String, Vec<Row>)>,
    queries: HashMap<String, Vec<Row>>,
    unavailable: Option<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose every call fails with `SourceUnavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Add a table. Rows are re-tagged with `name` when fetched.
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.push((name.into(), rows));
        self
    }

    /// Register the result rows for a literal query.
    pub fn with_query(mut self, query: impl Into<String>, rows: Vec<Row>) -> Self {
        self.queries.insert(query.into(), rows);
        self
    }

    fn check_available(&self) -> Result<()> {
        match &self.unavailable {
            Some(reason) => Err(Error::SourceUnavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl SourceAdapter for MemorySource {
    fn fetch_all(&self, cancel: &CancellationToken) -> Result<Vec<Row>> {
        self.check_available()?;
        let mut rows = Vec::new();
        for (table, table_rows) in &self.tables {
            cancel.check()?;
            rows.extend(
                table_rows
                    .iter()
                    .map(|row| Row::from_columns(Some(table.clone()), row.columns().clone())),
            );
        }
        debug!("MemorySource fetched {} rows from {} tables", rows.len(), self.tables.len());
        Ok(rows)
    }

    fn execute_query(&self, query: &str, cancel: &CancellationToken) -> Result<Vec<Row>> {
        self.check_available()?;
        cancel.check()?;
        let rows = self
            .queries
            .get(query)
            .ok_or_else(|| Error::SourceUnavailable(format!("no result for query: {}", query)))?;
        Ok(rows
            .iter()
            .map(|row| Row::from_columns(None, row.columns().clone()))
            .collect())
    }
}
