//! Runtime types.

use rowgraph_core::CancellationToken;
use rowgraph_store::StoreReport;
use serde::Serialize;
use uuid::Uuid;

/// Progress of the current (or last) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    /// Loading rules, source rows and sink-resident nodes.
    Loading,
    /// Applying rules and building the aggregate.
    Projecting,
    /// Persisting the aggregate through the sink.
    Flushing,
    Done,
    Failed,
}

/// Per-run context handed to the engine.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Identifies the run in logs and in its report.
    pub run_id: String,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new() -> Self {
        Self::with_cancel(CancellationToken::new())
    }

    /// Context observing an externally held cancellation token.
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            cancel,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "rulesApplied")]
    pub rules_applied: usize,
    /// Records produced by rules (before any unresolved skip).
    #[serde(rename = "recordsProjected")]
    pub records_projected: usize,
    /// Nodes in the aggregate, seed nodes included.
    pub nodes: usize,
    pub relationships: usize,
    /// Relationship records dropped because an endpoint did not resolve.
    /// Always zero when unresolved endpoints are fatal.
    #[serde(rename = "unresolvedSkipped")]
    pub unresolved_skipped: usize,
    /// Normalization warnings raised while projecting.
    pub warnings: usize,
    /// What the sink reported for the flush.
    pub store: StoreReport,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}
