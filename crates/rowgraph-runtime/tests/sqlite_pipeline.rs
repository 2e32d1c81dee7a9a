//! Runs from a SQLite source database into a SQLite graph database.

use std::path::Path;
use std::sync::Arc;

use rowgraph_core::{CancellationToken, EngineConfig, Value};
use rowgraph_rules::JsonRuleRepository;
use rowgraph_runtime::{RunContext, TransformationEngine};
use rowgraph_store::{GraphSink, SqliteGraphSink, SqliteSource};

const ORG_RULES: &str = r#"[
    {"name": "people", "rule_type": "node",
     "source": {"type": "table", "value": "users"},
     "target_type": "Person",
     "field_mappings": {"id": "id", "name": "name", "active": "active", "manager_id": "manager_id"}},
    {"name": "departments", "rule_type": "node",
     "source": {"type": "table", "value": "departments"},
     "target_type": "Department", "field_mappings": {"id": "id", "name": "name", "tags": "tags"}},
    {"name": "works_in", "rule_type": "relationship",
     "source": {"type": "table", "value": "user_departments"},
     "relationship_type": "WORKS_IN",
     "source_node": {"type": "Person", "key": "user_id", "target_field": "id"},
     "target_node": {"type": "Department", "key": "department_id", "target_field": "id"},
     "properties": {"role": "role", "start_date": "start_date"}}
]"#;

const REPORTS_TO_RULES: &str = r#"[
    {"name": "reports_to", "rule_type": "relationship",
     "relationship_type": "REPORTS_TO",
     "source": {"type": "graph"},
     "source_node": {"type": "Person", "key": "id", "target_field": "id"},
     "target_node": {"type": "Person", "key": "manager_id", "target_field": "id"}}
]"#;

fn create_source_db(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, active BOOLEAN, manager_id INTEGER);
         INSERT INTO users VALUES (1, 'Ada', 1, NULL);
         INSERT INTO users VALUES (2, 'Grace', 0, 1);
         CREATE TABLE departments (id INTEGER PRIMARY KEY, name TEXT, tags JSON);
         INSERT INTO departments VALUES (10, 'Research', '{\"floor\":3}');
         CREATE TABLE user_departments (user_id INTEGER, department_id INTEGER,
                                        role TEXT, start_date TIMESTAMP);
         INSERT INTO user_departments VALUES (1, 10, 'engineer', '2024-01-15 09:00:00');
         INSERT INTO user_departments VALUES (2, 10, 'analyst', '2024-03-01 09:00:00');",
    )
    .unwrap();
}

fn engine(source: &Path, graph: &Path, rules: &str, config: EngineConfig) -> TransformationEngine {
    TransformationEngine::new(
        Arc::new(SqliteSource::open(source, Vec::new()).unwrap()),
        Arc::new(SqliteGraphSink::open(graph).unwrap()),
        Arc::new(JsonRuleRepository::new(rules)),
        config,
    )
}

#[test]
fn test_sqlite_source_to_sqlite_graph() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.db");
    let graph_path = dir.path().join("graph.db");
    create_source_db(&source_path);

    let report = engine(&source_path, &graph_path, ORG_RULES, EngineConfig::default())
        .transform_and_store(&RunContext::new())
        .unwrap();
    assert_eq!(report.nodes, 3);
    assert_eq!(report.relationships, 2);
    assert_eq!(report.store.relationships_written, 2);

    let graph = SqliteGraphSink::open(&graph_path).unwrap();
    assert_eq!(graph.count_nodes(Some("Person")).unwrap(), 2);
    assert_eq!(graph.count_relationships(Some("WORKS_IN")).unwrap(), 2);

    let people = graph
        .fetch_nodes("Person", &CancellationToken::new())
        .unwrap();
    assert_eq!(people[0].get("id"), Some(&Value::from("1")));
    assert_eq!(people[0].get("active"), Some(&Value::Bool(true)));
    assert_eq!(people[0].get("manager_id"), Some(&Value::Null));
    assert_eq!(people[1].get("manager_id"), Some(&Value::from("1")));

    let departments = graph
        .fetch_nodes("Department", &CancellationToken::new())
        .unwrap();
    assert_eq!(departments[0].get("tags"), Some(&Value::from(r#"{"floor":3}"#)));

    let rels = graph.relationships().unwrap();
    assert_eq!(rels[0].properties["start_date"], Value::from("2024-01-15T09:00:00+00:00"));
}

#[test]
fn test_graph_sourced_rule_over_persisted_nodes() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.db");
    let graph_path = dir.path().join("graph.db");
    create_source_db(&source_path);

    engine(&source_path, &graph_path, ORG_RULES, EngineConfig::default())
        .transform_and_store(&RunContext::new())
        .unwrap();

    let config = EngineConfig {
        fatal_unresolved: false,
        ..EngineConfig::default()
    };
    let report = engine(&source_path, &graph_path, REPORTS_TO_RULES, config)
        .transform_and_store(&RunContext::new())
        .unwrap();
    // Ada has no manager.
    assert_eq!(report.unresolved_skipped, 1);
    assert_eq!(report.relationships, 1);

    let graph = SqliteGraphSink::open(&graph_path).unwrap();
    assert_eq!(graph.count_nodes(None).unwrap(), 3);
    assert_eq!(graph.count_relationships(None).unwrap(), 3);

    let reports_to: Vec<_> = graph
        .relationships()
        .unwrap()
        .into_iter()
        .filter(|rel| rel.rel_type == "REPORTS_TO")
        .collect();
    assert_eq!(reports_to.len(), 1);
    assert_eq!(reports_to[0].source_id, "2");
    assert_eq!(reports_to[0].target_id, "1");

    // Seeded nodes are re-stored without losing properties.
    let people = graph
        .fetch_nodes("Person", &CancellationToken::new())
        .unwrap();
    assert_eq!(people[1].get("name"), Some(&Value::from("Grace")));
}
