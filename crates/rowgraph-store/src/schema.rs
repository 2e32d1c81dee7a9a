//! Database schema SQL for the SQLite graph sink.

/// Nodes keyed by `(label, id)`; `seq` keeps first-insertion order.
pub const NODES_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS graph_nodes (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL,
    id TEXT NOT NULL,
    properties_json TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (label, id)
);

CREATE INDEX IF NOT EXISTS idx_graph_nodes_label ON graph_nodes(label);
"#;

/// Relationships reference endpoints by `(label, id)`; `rel_type` is the
/// literal relationship type.
pub const RELATIONSHIPS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS graph_relationships (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    rel_type TEXT NOT NULL,
    direction TEXT NOT NULL,
    source_label TEXT NOT NULL,
    source_id TEXT NOT NULL,
    target_label TEXT NOT NULL,
    target_id TEXT NOT NULL,
    properties_json TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_graph_relationships_type ON graph_relationships(rel_type);
CREATE INDEX IF NOT EXISTS idx_graph_relationships_source ON graph_relationships(source_label, source_id);
"#;
