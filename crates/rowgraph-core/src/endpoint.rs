//! Relationship direction and endpoint descriptors shared by records and the graph.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Declared direction of a relationship.
///
/// Advisory metadata: persistence always runs from source to target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outgoing => write!(f, "outgoing"),
            Self::Incoming => write!(f, "incoming"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outgoing" => Ok(Self::Outgoing),
            "incoming" => Ok(Self::Incoming),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// "The node labelled `label` whose property `field` equals `key`."
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointRef {
    pub label: String,
    pub key: Value,
    pub field: String,
}

impl EndpointRef {
    pub fn new(label: impl Into<String>, key: impl Into<Value>, field: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
            field: field.into(),
        }
    }
}
