//! Automatic task completion.
//!
//! Reply-chasing tasks exist to get an answer out of someone. Once inbound
//! correspondence arrives after the task was created, the chase is over and
//! the engine closes the task on the staff's behalf.

use serde_json::json;

use crate::db::types::{ActionType, DbClaim, NewLogEntry};
use crate::db::ClaimDb;
use crate::error::EngineError;

/// Title fragments that mark a task as reply-chasing.
pub const FOLLOW_UP_TITLE_MARKERS: &[&str] = &["follow up", "follow-up", "reminder"];

pub fn is_follow_up_title(title: &str) -> bool {
    let title = title.to_lowercase();
    FOLLOW_UP_TITLE_MARKERS.iter().any(|m| title.contains(m))
}

/// Close every open reply-chasing task that inbound correspondence has
/// answered. Returns how many tasks were completed.
pub fn auto_complete_tasks(db: &ClaimDb, claim: &DbClaim) -> Result<u32, EngineError> {
    let mut completed = 0;
    for task in db.get_open_tasks(&claim.id)? {
        if !is_follow_up_title(&task.title) {
            continue;
        }
        if !db.has_inbound_since(&claim.id, &task.created_at)? {
            continue;
        }
        // Status guard in the UPDATE keeps this idempotent under overlap
        if !db.complete_task(&task.id, None)? {
            continue;
        }
        db.append_log(&NewLogEntry {
            claim_id: &claim.id,
            action_type: ActionType::TaskCompleted,
            details: json!({
                "task_id": task.id,
                "task_title": task.title,
                "reason": "inbound_correspondence_received",
            }),
            was_auto_executed: true,
            result: "completed",
            natural_key: None,
            trigger_source: "engine",
        })?;
        log::info!("Auto-completed task {} on claim {}", task.id, claim.id);
        completed += 1;
    }
    Ok(completed)
}
