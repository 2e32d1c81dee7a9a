//! Rowgraph Graph — property normalization and the in-memory graph aggregate.

pub mod aggregate;
pub mod normalize;
pub mod types;

pub use aggregate::GraphAggregate;
pub use normalize::{normalize, NormalizationWarning, Normalizer};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use types::*;
