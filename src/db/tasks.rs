use rusqlite::params;

use super::*;

impl ClaimDb {
    // =========================================================================
    // Claim tasks
    // =========================================================================

    fn map_task_row(row: &rusqlite::Row) -> rusqlite::Result<DbTask> {
        Ok(DbTask {
            id: row.get(0)?,
            claim_id: row.get(1)?,
            title: row.get(2)?,
            status: row.get(3)?,
            due_at: row.get(4)?,
            completed_at: row.get(5)?,
            completed_by: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    pub fn create_task(
        &self,
        claim_id: &str,
        title: &str,
        due_at: Option<&str>,
    ) -> Result<String, DbError> {
        let id = format!("task-{}", uuid::Uuid::new_v4());
        self.conn.execute(
            "INSERT INTO claim_tasks (id, claim_id, title, due_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, claim_id, title, due_at],
        )?;
        Ok(id)
    }

    pub fn get_open_tasks(&self, claim_id: &str) -> Result<Vec<DbTask>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, claim_id, title, status, due_at, completed_at, completed_by, created_at
             FROM claim_tasks
             WHERE claim_id = ?1 AND status = 'open'
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![claim_id], Self::map_task_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Complete a task if it is still open. Returns false when the task was
    /// already completed (or does not exist), so re-runs are harmless.
    /// System completions pass `None` and leave `completed_by` null.
    pub fn complete_task(&self, task_id: &str, completed_by: Option<&str>) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE claim_tasks
             SET status = 'completed',
                 completed_at = datetime('now'),
                 completed_by = ?2
             WHERE id = ?1 AND status = 'open'",
            params![task_id, completed_by],
        )?;
        Ok(changed > 0)
    }
}
