//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Longest text value (in characters) the graph sink accepts.
pub const MAX_TEXT_LEN: usize = 10_000;

/// Name given to nodes whose record carries none.
pub const DEFAULT_NODE_NAME: &str = "default_name";

/// How list-valued properties reach the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListPolicy {
    /// Render the whole list as JSON text.
    #[default]
    Stringify,
    /// Keep a list of normalized scalars.
    Preserve,
}

impl std::str::FromStr for ListPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stringify" => Ok(Self::Stringify),
            "preserve" => Ok(Self::Preserve),
            other => Err(format!("unknown list policy: {}", other)),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Text values longer than this are truncated.
    pub max_text_len: usize,
    /// List-valued property handling.
    pub list_policy: ListPolicy,
    /// Assign a fresh UUID `id` and `default_name` to node records lacking them.
    /// When off, such records fail with `MissingIdentity`.
    pub inject_identity_defaults: bool,
    /// Name used when `inject_identity_defaults` fills in a missing `name`.
    pub default_name: String,
    /// Abort the run on the first unresolved relationship endpoint.
    /// When off, the relationship is logged and skipped.
    pub fatal_unresolved: bool,
    /// Apply rules by descending priority instead of declaration order.
    pub order_by_priority: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_text_len: MAX_TEXT_LEN,
            list_policy: ListPolicy::default(),
            inject_identity_defaults: true,
            default_name: DEFAULT_NODE_NAME.to_string(),
            fatal_unresolved: true,
            order_by_priority: false,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_text_len = std::env::var("ROWGRAPH_MAX_TEXT_LEN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_text_len);

        let list_policy = std::env::var("ROWGRAPH_LIST_POLICY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.list_policy);

        Self {
            max_text_len,
            list_policy,
            inject_identity_defaults: env_flag("ROWGRAPH_INJECT_DEFAULTS")
                .unwrap_or(defaults.inject_identity_defaults),
            fatal_unresolved: env_flag("ROWGRAPH_FATAL_UNRESOLVED")
                .unwrap_or(defaults.fatal_unresolved),
            order_by_priority: env_flag("ROWGRAPH_ORDER_BY_PRIORITY")
                .unwrap_or(defaults.order_by_priority),
            default_name: defaults.default_name,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Ignoring unrecognized value for {}: {}", name, raw);
            None
        }
    }
}
