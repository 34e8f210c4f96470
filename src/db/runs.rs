use rusqlite::params;

use crate::types::TickSummary;

use super::*;

impl ClaimDb {
    // =========================================================================
    // Engine run history
    // =========================================================================

    fn map_run_row(row: &rusqlite::Row) -> rusqlite::Result<EngineRun> {
        let errors: Option<String> = row.get(9)?;
        let errors = errors
            .as_deref()
            .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
            .unwrap_or_default();
        Ok(EngineRun {
            id: row.get(0)?,
            kind: row.get(1)?,
            started_at: row.get(2)?,
            finished_at: row.get(3)?,
            claims_processed: row.get(4)?,
            tasks_completed: row.get(5)?,
            emails_sent: row.get(6)?,
            escalations: row.get(7)?,
            documents_processed: row.get(8)?,
            errors,
        })
    }

    /// Persist a finished tick's summary.
    pub fn record_run(&self, summary: &TickSummary) -> Result<(), DbError> {
        let errors = serde_json::to_string(&summary.errors).unwrap_or_else(|_| "[]".into());
        self.conn.execute(
            "INSERT INTO engine_runs
                (id, kind, started_at, finished_at, claims_processed,
                 tasks_completed, emails_sent, escalations, documents_processed, errors)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                summary.run_id,
                summary.kind.as_str(),
                summary.started_at,
                summary.finished_at,
                summary.claims_processed,
                summary.tasks_completed,
                summary.emails_sent,
                summary.escalations,
                summary.documents_processed,
                errors,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub fn recent_runs(&self, limit: i64) -> Result<Vec<EngineRun>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, started_at, finished_at, claims_processed,
                    tasks_completed, emails_sent, escalations, documents_processed, errors
             FROM engine_runs
             ORDER BY started_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], Self::map_run_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }
}
