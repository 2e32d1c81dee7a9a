//! SQLite-backed graph sink.
//!
//! Nodes are upserted by `(label, id)` with property merge; relationships are
//! appended after both endpoint ids are found. One `store_graph` call is one
//! transaction.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use rowgraph_core::{CancellationToken, Error, Properties, Result, Row};
use rowgraph_graph::{GraphAggregate, GraphNode, GraphSnapshot, RelationshipSnapshot};

use crate::schema::{NODES_SCHEMA_SQL, RELATIONSHIPS_SCHEMA_SQL};
use crate::sink::{node_row, GraphSink, StoreReport};

/// Property graph persisted in two SQLite tables.
pub struct SqliteGraphSink {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteGraphSink {
    /// Open or create the graph database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path).map_err(unavailable)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(unavailable)?;
        Self::init_schema(&conn)?;

        info!("SqliteGraphSink opened: path={}", db_path.display());
        let sink = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        debug!(
            "SqliteGraphSink holds {} nodes, {} relationships",
            sink.count_nodes(None)?,
            sink.count_relationships(None)?
        );
        Ok(sink)
    }

    /// A private in-memory graph database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!("{}\n{}", NODES_SCHEMA_SQL, RELATIONSHIPS_SCHEMA_SQL);
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::SinkUnavailable(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Count nodes, optionally of one label.
    pub fn count_nodes(&self, label: Option<&str>) -> Result<i64> {
        let conn = self.conn.lock();
        let count = match label {
            Some(label) => conn.query_row(
                "SELECT COUNT(*) FROM graph_nodes WHERE label = ?1",
                params![label],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM graph_nodes", [], |row| row.get(0)),
        }
        .map_err(unavailable)?;
        Ok(count)
    }

    /// Count relationships, optionally of one type.
    pub fn count_relationships(&self, rel_type: Option<&str>) -> Result<i64> {
        let conn = self.conn.lock();
        let count = match rel_type {
            Some(rel_type) => conn.query_row(
                "SELECT COUNT(*) FROM graph_relationships WHERE rel_type = ?1",
                params![rel_type],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM graph_relationships", [], |row| {
                row.get(0)
            }),
        }
        .map_err(unavailable)?;
        Ok(count)
    }

    /// Every stored relationship, in insertion order.
    pub fn relationships(&self) -> Result<Vec<RelationshipSnapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT rel_type, direction, source_label, source_id, target_label, target_id, \
                 properties_json FROM graph_relationships ORDER BY seq",
            )
            .map_err(unavailable)?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(unavailable)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(unavailable)?;

        raw.into_iter()
            .map(
                |(rel_type, direction, source_label, source_id, target_label, target_id, json)| {
                    Ok(RelationshipSnapshot {
                        rel_type,
                        direction: direction.parse().map_err(Error::SinkUnavailable)?,
                        source_label,
                        source_id,
                        target_label,
                        target_id,
                        properties: serde_json::from_str(&json)?,
                    })
                },
            )
            .collect()
    }

    /// Persist a snapshot: nodes first, then relationships whose endpoints
    /// exist. Missing endpoints are logged and skipped, not fatal.
    pub fn store_snapshot(
        &self,
        snapshot: &GraphSnapshot,
        cancel: &CancellationToken,
    ) -> Result<StoreReport> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(unavailable)?;
        let now = chrono::Utc::now().timestamp_millis();
        let mut report = StoreReport::default();

        for node in &snapshot.nodes {
            cancel.check()?;
            Self::upsert_node(&tx, node, now)?;
            report.nodes_written += 1;
        }

        for rel in &snapshot.relationships {
            cancel.check()?;
            if !Self::node_exists(&tx, &rel.source_label, &rel.source_id)?
                || !Self::node_exists(&tx, &rel.target_label, &rel.target_id)?
            {
                warn!(
                    "Skipping {} relationship: endpoint {}:{} or {}:{} not found",
                    rel.rel_type, rel.source_label, rel.source_id, rel.target_label, rel.target_id
                );
                report.relationships_skipped += 1;
                continue;
            }
            tx.execute(
                "INSERT INTO graph_relationships (rel_type, direction, source_label, source_id, \
                 target_label, target_id, properties_json, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    rel.rel_type,
                    rel.direction.to_string(),
                    rel.source_label,
                    rel.source_id,
                    rel.target_label,
                    rel.target_id,
                    serde_json::to_string(&rel.properties)?,
                    now,
                ],
            )
            .map_err(unavailable)?;
            report.relationships_written += 1;
        }

        tx.commit().map_err(unavailable)?;
        debug!(
            "SqliteGraphSink stored {} nodes, {} relationships ({} skipped)",
            report.nodes_written, report.relationships_written, report.relationships_skipped
        );
        Ok(report)
    }

    fn upsert_node(tx: &Transaction<'_>, node: &GraphNode, now: i64) -> Result<()> {
        let existing_json: Option<String> = tx
            .prepare_cached("SELECT properties_json FROM graph_nodes WHERE label = ?1 AND id = ?2")
            .map_err(unavailable)?
            .query_row(params![node.label, node.id], |row| row.get(0))
            .optional()
            .map_err(unavailable)?;

        let mut properties: Properties = match existing_json {
            Some(json) => serde_json::from_str(&json)?,
            None => Properties::new(),
        };
        properties.extend(node.properties.clone());

        tx.prepare_cached(
            "INSERT INTO graph_nodes (label, id, properties_json, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(label, id) DO UPDATE SET \
             properties_json = excluded.properties_json, updated_at = excluded.updated_at",
        )
        .map_err(unavailable)?
        .execute(params![
            node.label,
            node.id,
            serde_json::to_string(&properties)?,
            now
        ])
        .map_err(unavailable)?;
        Ok(())
    }

    fn node_exists(tx: &Transaction<'_>, label: &str, id: &str) -> Result<bool> {
        let found: Option<i64> = tx
            .prepare_cached("SELECT 1 FROM graph_nodes WHERE label = ?1 AND id = ?2")
            .map_err(unavailable)?
            .query_row(params![label, id], |row| row.get(0))
            .optional()
            .map_err(unavailable)?;
        Ok(found.is_some())
    }
}

impl GraphSink for SqliteGraphSink {
    fn fetch_nodes(&self, label: &str, cancel: &CancellationToken) -> Result<Vec<Row>> {
        cancel.check()?;
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, properties_json FROM graph_nodes WHERE label = ?1 ORDER BY seq",
            )
            .map_err(unavailable)?;
        let raw = stmt
            .query_map(params![label], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(unavailable)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(unavailable)?;

        let mut rows = Vec::with_capacity(raw.len());
        for (id, json) in raw {
            cancel.check()?;
            let properties: Properties = serde_json::from_str(&json)?;
            rows.push(node_row(label, &id, &properties));
        }
        Ok(rows)
    }

    fn store_graph(
        &self,
        graph: &GraphAggregate,
        cancel: &CancellationToken,
    ) -> Result<StoreReport> {
        self.store_snapshot(&graph.snapshot(), cancel)
    }
}

fn unavailable(e: rusqlite::Error) -> Error {
    Error::SinkUnavailable(e.to_string())
}
