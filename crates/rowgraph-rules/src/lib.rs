//! Rowgraph Rules — projection rules, rule-set documents, row to record application.
//!
//! A rule turns one source row into either a node record or a relationship
//! record. A rule set is the ordered collection applied during one run.

pub mod document;
pub mod record;
pub mod repository;
pub mod rule;

pub use document::RuleSet;
pub use record::{NodeRecord, Record, RelationshipRecord};
pub use repository::{JsonRuleRepository, RuleRepository, StaticRuleRepository};
pub use rule::{EndpointMapping, NodeRule, RelationshipRule, Rule, RuleKind, RuleSource};
