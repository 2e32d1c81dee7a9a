//! Error types for Rowgraph.

use thiserror::Error;

/// Which end of a relationship an endpoint descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSide {
    Source,
    Target,
}

impl std::fmt::Display for EndpointSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Missing identity: {label} node has no '{field}'")]
    MissingIdentity { label: String, field: String },

    #[error(
        "Unresolved endpoint: {relationship} {side} has no {label} node with {field} = {key}"
    )]
    UnresolvedEndpoint {
        relationship: String,
        side: EndpointSide,
        label: String,
        field: String,
        key: String,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
