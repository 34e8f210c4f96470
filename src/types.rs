//! Shared engine types.

use serde::Serialize;

use crate::db::types::now_ts;

/// The two batch routines the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickKind {
    Engine,
    FollowUp,
}

impl TickKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickKind::Engine => "engine",
            TickKind::FollowUp => "follow_up",
        }
    }
}

/// Counters and outcomes for one tick, returned to the caller and persisted
/// to `engine_runs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub run_id: String,
    pub kind: TickKind,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub claims_processed: u32,
    pub tasks_completed: u32,
    pub emails_sent: u32,
    pub escalations: u32,
    pub documents_processed: u32,
    /// Per-claim failures. One claim's error never aborts the batch, it is
    /// recorded here and the run moves on.
    pub errors: Vec<String>,
}

impl TickSummary {
    pub fn begin(kind: TickKind) -> Self {
        Self {
            run_id: format!("run-{}", uuid::Uuid::new_v4()),
            kind,
            started_at: now_ts(),
            finished_at: None,
            claims_processed: 0,
            tasks_completed: 0,
            emails_sent: 0,
            escalations: 0,
            documents_processed: 0,
            errors: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(now_ts());
    }

    pub fn record_error(&mut self, claim_id: &str, err: impl std::fmt::Display) {
        log::warn!("claim {claim_id}: {err}");
        self.errors.push(format!("{claim_id}: {err}"));
    }
}
