//! Shared type definitions for the database layer.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// SQLite datetime format used for every timestamp column
/// (comparable with `datetime('now')` in queries).
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date-only format used for deadline columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Current UTC time as a database timestamp string.
pub fn now_ts() -> String {
    Utc::now().format(TS_FORMAT).to_string()
}

/// How much a claim's automation may act without human approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    Manual,
    SemiAutonomous,
    FullyAutonomous,
}

impl AutonomyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::Manual => "manual",
            AutonomyLevel::SemiAutonomous => "semi_autonomous",
            AutonomyLevel::FullyAutonomous => "fully_autonomous",
        }
    }

    /// Parse a stored level. Unknown values collapse to `Manual`, which the
    /// engine never acts on.
    pub fn parse(s: &str) -> Self {
        match s {
            "semi_autonomous" => AutonomyLevel::SemiAutonomous,
            "fully_autonomous" => AutonomyLevel::FullyAutonomous,
            _ => AutonomyLevel::Manual,
        }
    }
}

/// Action log entry categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    TaskCompleted,
    EmailSent,
    Escalation,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::TaskCompleted => "task_completed",
            ActionType::EmailSent => "email_sent",
            ActionType::Escalation => "escalation",
        }
    }
}

/// The two independently scheduled follow-up cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    General,
    RecoverableDepreciation,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::General => "general",
            TrackKind::RecoverableDepreciation => "recoverable_depreciation",
        }
    }

    /// Column prefix inside `automation_policies`.
    pub(crate) fn column_prefix(&self) -> &'static str {
        match self {
            TrackKind::General => "follow_up",
            TrackKind::RecoverableDepreciation => "rd_follow_up",
        }
    }
}

/// A row from the `claims` table (display fields the engine reads).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbClaim {
    pub id: String,
    pub claim_number: String,
    pub policy_number: Option<String>,
    pub status: String,
    pub loss_type: Option<String>,
    pub adjuster_name: Option<String>,
    pub adjuster_email: Option<String>,
    pub policyholder_name: Option<String>,
    pub policyholder_email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One follow-up track's scheduling state within a policy row.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpTrack {
    pub enabled: bool,
    pub interval_days: i64,
    pub max_count: i64,
    pub current_count: i64,
    pub next_run_at: Option<String>,
    pub last_sent_at: Option<String>,
    pub stopped_at: Option<String>,
    pub stop_reason: Option<String>,
}

impl FollowUpTrack {
    /// A track is live when it is enabled and no terminal stop is recorded.
    pub fn is_live(&self) -> bool {
        self.enabled && self.stopped_at.is_none()
    }
}

/// A row from the `automation_policies` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationPolicy {
    pub claim_id: String,
    pub autonomy_level: AutonomyLevel,
    pub is_enabled: bool,
    pub daily_action_limit: i64,
    pub auto_complete_tasks: bool,
    pub auto_respond_without_approval: bool,
    pub auto_escalate_urgency: bool,
    /// Lower-cased phrases that force human review. Empty means the engine's
    /// built-in defaults apply.
    pub keyword_blockers: Vec<String>,
    pub general: FollowUpTrack,
    pub recoverable_depreciation: FollowUpTrack,
}

impl AutomationPolicy {
    pub fn track(&self, kind: TrackKind) -> &FollowUpTrack {
        match kind {
            TrackKind::General => &self.general,
            TrackKind::RecoverableDepreciation => &self.recoverable_depreciation,
        }
    }
}

/// A row from the `action_log` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogEntry {
    pub id: String,
    pub claim_id: String,
    pub action_type: String,
    pub details: Option<String>,
    pub was_auto_executed: bool,
    pub result: Option<String>,
    pub natural_key: Option<String>,
    pub trigger_source: String,
    pub executed_at: String,
}

/// Input for appending to the action log.
pub struct NewLogEntry<'a> {
    pub claim_id: &'a str,
    pub action_type: ActionType,
    pub details: serde_json::Value,
    pub was_auto_executed: bool,
    pub result: &'a str,
    /// Stable identity of a detect-and-log condition. When set, the append
    /// is insert-or-ignore against the natural-key unique index.
    pub natural_key: Option<String>,
    pub trigger_source: &'a str,
}

/// A row from the `pending_actions` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: String,
    pub claim_id: String,
    pub action_type: String,
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub auto_executed: bool,
    pub created_at: String,
}

/// A row from the `carrier_deadlines` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierDeadline {
    pub id: String,
    pub claim_id: String,
    pub deadline_type: String,
    pub trigger_date: String,
    pub offset_days: i64,
    pub is_business_days: bool,
    pub deadline_date: String,
    pub status: String,
    pub carrier_response_date: Option<String>,
}

/// A row from the `claim_tasks` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTask {
    pub id: String,
    pub claim_id: String,
    pub title: String,
    pub status: String,
    pub due_at: Option<String>,
    pub completed_at: Option<String>,
    pub completed_by: Option<String>,
    pub created_at: String,
}

/// A row from the `claim_documents` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbDocument {
    pub id: String,
    pub claim_id: String,
    pub file_name: String,
    pub classification: Option<String>,
    pub classification_confidence: Option<f64>,
    pub classified_at: Option<String>,
}

/// A row from the `engine_runs` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRun {
    pub id: String,
    pub kind: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub claims_processed: i64,
    pub tasks_completed: i64,
    pub emails_sent: i64,
    pub escalations: i64,
    pub documents_processed: i64,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autonomy_level_round_trip() {
        for level in [
            AutonomyLevel::Manual,
            AutonomyLevel::SemiAutonomous,
            AutonomyLevel::FullyAutonomous,
        ] {
            assert_eq!(AutonomyLevel::parse(level.as_str()), level);
        }
    }

    #[test]
    fn test_autonomy_level_unknown_is_manual() {
        assert_eq!(AutonomyLevel::parse("turbo"), AutonomyLevel::Manual);
        assert_eq!(AutonomyLevel::parse(""), AutonomyLevel::Manual);
    }

    #[test]
    fn test_track_is_live() {
        let mut track = FollowUpTrack {
            enabled: true,
            interval_days: 7,
            max_count: 6,
            ..Default::default()
        };
        assert!(track.is_live());

        track.stopped_at = Some(now_ts());
        assert!(!track.is_live());

        track.stopped_at = None;
        track.enabled = false;
        assert!(!track.is_live());
    }
}
