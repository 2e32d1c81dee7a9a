//! SQLite-backed source adapter.
//!
//! Storage classes map onto `Value` directly. Declared column types refine
//! them: `BOOL*` integers become booleans, `DATETIME`/`TIMESTAMP` text becomes
//! a timestamp when it parses, `JSON` text becomes a nested value.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::{debug, info};

use rowgraph_core::{CancellationToken, Error, Properties, Result, Row, Value};

use crate::source::SourceAdapter;

/// Reads whole tables and literal queries from a SQLite database.
pub struct SqliteSource {
    conn: Mutex<Connection>,
    tables: Vec<String>,
}

impl SqliteSource {
    /// Open a database file and dump the given tables on `fetch_all`.
    /// An empty table list means every user table in the database.
    pub fn open(db_path: impl AsRef<Path>, tables: Vec<String>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path).map_err(unavailable)?;
        let source = Self::from_connection(conn, tables)?;
        info!(
            "SqliteSource opened: {} tables, path={}",
            source.tables.len(),
            db_path.display()
        );
        Ok(source)
    }

    pub fn from_connection(conn: Connection, tables: Vec<String>) -> Result<Self> {
        let tables = if tables.is_empty() {
            Self::discover_tables(&conn)?
        } else {
            tables
        };
        Ok(Self {
            conn: Mutex::new(conn),
            tables,
        })
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    fn discover_tables(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(unavailable)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(unavailable)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(unavailable)?;
        Ok(names)
    }

    fn query_rows(
        conn: &Connection,
        sql: &str,
        table: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>> {
        let mut stmt = conn.prepare(sql).map_err(unavailable)?;
        let columns: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|c| {
                (
                    c.name().to_string(),
                    c.decl_type().map(|t| t.to_ascii_uppercase()),
                )
            })
            .collect();

        let mut rows = stmt.query([]).map_err(unavailable)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(unavailable)? {
            cancel.check()?;
            let mut values = Properties::new();
            for (i, (name, decl_type)) in columns.iter().enumerate() {
                let raw = row.get_ref(i).map_err(unavailable)?;
                values.insert(name.clone(), convert(raw, decl_type.as_deref()));
            }
            out.push(Row::from_columns(table.map(str::to_string), values));
        }
        Ok(out)
    }
}

impl SourceAdapter for SqliteSource {
    fn fetch_all(&self, cancel: &CancellationToken) -> Result<Vec<Row>> {
        let conn = self.conn.lock();
        let mut rows = Vec::new();
        for table in &self.tables {
            cancel.check()?;
            let sql = format!("SELECT * FROM {}", quote_identifier(table));
            let table_rows = Self::query_rows(&conn, &sql, Some(table), cancel)?;
            debug!("Fetched {} rows from {}", table_rows.len(), table);
            rows.extend(table_rows);
        }
        Ok(rows)
    }

    fn execute_query(&self, query: &str, cancel: &CancellationToken) -> Result<Vec<Row>> {
        cancel.check()?;
        let conn = self.conn.lock();
        Self::query_rows(&conn, query, None, cancel)
    }
}

fn unavailable(e: rusqlite::Error) -> Error {
    Error::SourceUnavailable(e.to_string())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn convert(raw: ValueRef<'_>, decl_type: Option<&str>) -> Value {
    let decl_type = decl_type.unwrap_or("");
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if decl_type.contains("BOOL") => Value::Bool(i != 0),
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if decl_type.contains("DATE") || decl_type.contains("TIME") {
                if let Some(ts) = parse_timestamp(&text) {
                    return Value::Timestamp(ts);
                }
            } else if decl_type.contains("JSON") {
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                    return Value::from_json(json);
                }
            }
            Value::Text(text)
        }
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}
