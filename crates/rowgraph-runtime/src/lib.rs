//! Rowgraph Runtime — the transformation engine.
//!
//! Loads a rule set, pulls rows from a source adapter, projects them into a
//! graph aggregate rule by rule, and flushes the aggregate to a graph sink.

pub mod engine;
pub mod types;

pub use engine::TransformationEngine;
pub use types::*;
