use rusqlite::params;

use super::*;

const POLICY_COLUMNS: &str = "claim_id, autonomy_level, is_enabled, daily_action_limit,
        auto_complete_tasks, auto_respond_without_approval, auto_escalate_urgency,
        keyword_blockers,
        follow_up_enabled, follow_up_interval_days, follow_up_max_count,
        follow_up_current_count, follow_up_next_run_at, follow_up_last_sent_at,
        follow_up_stopped_at, follow_up_stop_reason,
        rd_follow_up_enabled, rd_follow_up_interval_days, rd_follow_up_max_count,
        rd_follow_up_current_count, rd_follow_up_next_run_at, rd_follow_up_last_sent_at,
        rd_follow_up_stopped_at, rd_follow_up_stop_reason";

impl ClaimDb {
    // =========================================================================
    // Automation policies
    // =========================================================================

    fn map_policy_row(row: &rusqlite::Row) -> rusqlite::Result<AutomationPolicy> {
        let level: String = row.get(1)?;
        // Stored as a JSON array; anything unreadable falls back to the
        // engine defaults, which is the more conservative blocklist.
        let blockers: Option<String> = row.get(7)?;
        let keyword_blockers = blockers
            .as_deref()
            .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
            .unwrap_or_default();

        Ok(AutomationPolicy {
            claim_id: row.get(0)?,
            autonomy_level: AutonomyLevel::parse(&level),
            is_enabled: row.get(2)?,
            daily_action_limit: row.get(3)?,
            auto_complete_tasks: row.get(4)?,
            auto_respond_without_approval: row.get(5)?,
            auto_escalate_urgency: row.get(6)?,
            keyword_blockers,
            general: FollowUpTrack {
                enabled: row.get(8)?,
                interval_days: row.get(9)?,
                max_count: row.get(10)?,
                current_count: row.get(11)?,
                next_run_at: row.get(12)?,
                last_sent_at: row.get(13)?,
                stopped_at: row.get(14)?,
                stop_reason: row.get(15)?,
            },
            recoverable_depreciation: FollowUpTrack {
                enabled: row.get(16)?,
                interval_days: row.get(17)?,
                max_count: row.get(18)?,
                current_count: row.get(19)?,
                next_run_at: row.get(20)?,
                last_sent_at: row.get(21)?,
                stopped_at: row.get(22)?,
                stop_reason: row.get(23)?,
            },
        })
    }

    pub fn get_policy(&self, claim_id: &str) -> Result<Option<AutomationPolicy>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {POLICY_COLUMNS} FROM automation_policies WHERE claim_id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![claim_id], Self::map_policy_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Policies the automation batch acts on: enabled, at an autonomy level
    /// above manual. Ordered by claim id so runs are deterministic.
    pub fn load_active_policies(&self) -> Result<Vec<AutomationPolicy>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {POLICY_COLUMNS} FROM automation_policies
             WHERE is_enabled = 1
               AND autonomy_level IN ('semi_autonomous', 'fully_autonomous')
             ORDER BY claim_id"
        ))?;
        let rows = stmt.query_map([], Self::map_policy_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Policies whose `kind` track is due: live, with a scheduled time in the
    /// past. A NULL `next_run_at` on an enabled track counts as due: staff
    /// enable tracks without picking a date, and the first tick starts the
    /// cadence. At-cap tracks are still returned; the scheduler stops them.
    pub fn load_due_follow_ups(&self, kind: TrackKind) -> Result<Vec<AutomationPolicy>, DbError> {
        let p = kind.column_prefix();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {POLICY_COLUMNS} FROM automation_policies
             WHERE {p}_enabled = 1
               AND {p}_stopped_at IS NULL
               AND ({p}_next_run_at IS NULL OR {p}_next_run_at <= datetime('now'))
             ORDER BY claim_id"
        ))?;
        let rows = stmt.query_map([], Self::map_policy_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Advance a track after a follow-up goes out: bump the counter, stamp
    /// `last_sent_at`, and schedule the next run one interval out. Reaching
    /// the cap stops the track. Returns `(new_count, stopped)`.
    pub fn record_follow_up_sent(
        &self,
        claim_id: &str,
        kind: TrackKind,
    ) -> Result<(i64, bool), DbError> {
        let p = kind.column_prefix();
        self.conn.execute(
            &format!(
                "UPDATE automation_policies
                 SET {p}_current_count = {p}_current_count + 1,
                     {p}_last_sent_at = datetime('now'),
                     {p}_next_run_at = datetime('now', '+' || {p}_interval_days || ' days'),
                     updated_at = datetime('now')
                 WHERE claim_id = ?1"
            ),
            params![claim_id],
        )?;

        let (count, max): (i64, i64) = self.conn.query_row(
            &format!(
                "SELECT {p}_current_count, {p}_max_count
                 FROM automation_policies WHERE claim_id = ?1"
            ),
            params![claim_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let stopped = count >= max;
        if stopped {
            self.stop_follow_up(claim_id, kind, "max_count_reached")?;
        }
        Ok((count, stopped))
    }

    /// Terminally stop a track. Idempotent; an already-stopped track keeps
    /// its original stop record.
    pub fn stop_follow_up(
        &self,
        claim_id: &str,
        kind: TrackKind,
        reason: &str,
    ) -> Result<(), DbError> {
        let p = kind.column_prefix();
        self.conn.execute(
            &format!(
                "UPDATE automation_policies
                 SET {p}_stopped_at = datetime('now'),
                     {p}_stop_reason = ?2,
                     updated_at = datetime('now')
                 WHERE claim_id = ?1 AND {p}_stopped_at IS NULL"
            ),
            params![claim_id, reason],
        )?;
        Ok(())
    }
}
