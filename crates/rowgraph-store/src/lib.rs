//! Rowgraph Store — source and graph sink adapters.
//!
//! The engine only sees the `SourceAdapter` and `GraphSink` traits. In-memory
//! implementations back tests; SQLite implementations are the reference
//! drivers.

pub mod schema;
pub mod sink;
pub mod source;
pub mod sqlite_sink;
pub mod sqlite_source;

pub use sink::{node_row, GraphSink, MemoryGraphSink, StoreReport};
pub use source::{MemorySource, SourceAdapter};
pub use sqlite_sink::SqliteGraphSink;
pub use sqlite_source::SqliteSource;
