use rusqlite::params;

use super::*;

impl ClaimDb {
    // =========================================================================
    // Action log (audit trail + idempotency ledger + quota accounting)
    // =========================================================================

    fn map_log_row(row: &rusqlite::Row) -> rusqlite::Result<ActionLogEntry> {
        Ok(ActionLogEntry {
            id: row.get(0)?,
            claim_id: row.get(1)?,
            action_type: row.get(2)?,
            details: row.get(3)?,
            was_auto_executed: row.get(4)?,
            result: row.get(5)?,
            natural_key: row.get(6)?,
            trigger_source: row.get(7)?,
            executed_at: row.get(8)?,
        })
    }

    /// Append an entry to the action log. Entries carrying a natural key are
    /// inserted with OR IGNORE against the natural-key unique index, so a
    /// condition already logged under that key is silently dropped.
    ///
    /// Returns whether a row was actually written.
    pub fn append_log(&self, entry: &NewLogEntry) -> Result<bool, DbError> {
        let id = format!("al-{}", uuid::Uuid::new_v4());
        let details = entry.details.to_string();
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO action_log
                (id, claim_id, action_type, details, was_auto_executed,
                 result, natural_key, trigger_source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                entry.claim_id,
                entry.action_type.as_str(),
                details,
                entry.was_auto_executed,
                entry.result,
                entry.natural_key,
                entry.trigger_source,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Auto-executed actions recorded for the claim during the current UTC
    /// calendar day. This is what the daily action quota counts.
    pub fn count_auto_actions_today(&self, claim_id: &str) -> Result<i64, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM action_log
             WHERE claim_id = ?1
               AND was_auto_executed = 1
               AND date(executed_at) = date('now')",
            params![claim_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Whether an entry of this type with a natural key under `key_prefix`
    /// was written within the last `days` days. Used by sliding-window
    /// conditions whose natural keys rotate (one per day).
    pub fn has_recent_natural_entry(
        &self,
        claim_id: &str,
        action_type: ActionType,
        key_prefix: &str,
        days: i64,
    ) -> Result<bool, DbError> {
        let cutoff = format!("-{days} days");
        let found: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM action_log
                WHERE claim_id = ?1
                  AND action_type = ?2
                  AND natural_key LIKE ?3 || '%'
                  AND executed_at >= datetime('now', ?4))",
            params![claim_id, action_type.as_str(), key_prefix, cutoff],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    pub fn get_log_for_claim(
        &self,
        claim_id: &str,
        limit: i64,
    ) -> Result<Vec<ActionLogEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, claim_id, action_type, details, was_auto_executed,
                    result, natural_key, trigger_source, executed_at
             FROM action_log
             WHERE claim_id = ?1
             ORDER BY executed_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![claim_id, limit], Self::map_log_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{seed_claim, test_db};
    use super::*;
    use serde_json::json;

    fn entry<'a>(claim_id: &'a str, natural_key: Option<String>) -> NewLogEntry<'a> {
        NewLogEntry {
            claim_id,
            action_type: ActionType::Escalation,
            details: json!({"reason": "deadline_approaching"}),
            was_auto_executed: true,
            result: "flagged",
            natural_key,
            trigger_source: "engine",
        }
    }

    #[test]
    fn test_natural_key_dedup() {
        let db = test_db();
        seed_claim(&db, "clm-1");

        let first = db
            .append_log(&entry("clm-1", Some("deadline:dl-1".into())))
            .expect("append");
        let second = db
            .append_log(&entry("clm-1", Some("deadline:dl-1".into())))
            .expect("append");
        assert!(first);
        assert!(!second, "same natural key collapses to one row");

        // A different key, or a different claim, still inserts
        assert!(db
            .append_log(&entry("clm-1", Some("deadline:dl-2".into())))
            .expect("append"));
        seed_claim(&db, "clm-2");
        assert!(db
            .append_log(&entry("clm-2", Some("deadline:dl-1".into())))
            .expect("append"));
    }

    #[test]
    fn test_null_natural_keys_never_collide() {
        let db = test_db();
        seed_claim(&db, "clm-1");

        assert!(db.append_log(&entry("clm-1", None)).expect("append"));
        assert!(db.append_log(&entry("clm-1", None)).expect("append"));

        let rows = db.get_log_for_claim("clm-1", 10).expect("query");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_quota_counts_only_todays_auto_actions() {
        let db = test_db();
        seed_claim(&db, "clm-1");
        seed_claim(&db, "clm-2");

        // Two auto actions today, one manual, one from yesterday, one on
        // another claim.
        for _ in 0..2 {
            db.append_log(&NewLogEntry {
                claim_id: "clm-1",
                action_type: ActionType::EmailSent,
                details: json!({}),
                was_auto_executed: true,
                result: "sent",
                natural_key: None,
                trigger_source: "engine",
            })
            .expect("append");
        }
        db.append_log(&NewLogEntry {
            claim_id: "clm-1",
            action_type: ActionType::EmailSent,
            details: json!({}),
            was_auto_executed: false,
            result: "sent",
            natural_key: None,
            trigger_source: "staff",
        })
        .expect("append");
        db.conn_ref()
            .execute(
                "INSERT INTO action_log (id, claim_id, action_type, was_auto_executed, executed_at)
                 VALUES ('al-old', 'clm-1', 'email_sent', 1, datetime('now', '-1 day'))",
                [],
            )
            .expect("yesterday");
        db.append_log(&NewLogEntry {
            claim_id: "clm-2",
            action_type: ActionType::EmailSent,
            details: json!({}),
            was_auto_executed: true,
            result: "sent",
            natural_key: None,
            trigger_source: "engine",
        })
        .expect("append");

        assert_eq!(db.count_auto_actions_today("clm-1").expect("count"), 2);
        assert_eq!(db.count_auto_actions_today("clm-2").expect("count"), 1);
    }

    #[test]
    fn test_recent_natural_entry_window() {
        let db = test_db();
        seed_claim(&db, "clm-1");

        db.append_log(&entry("clm-1", Some("stalled:2026-08-22".into())))
            .expect("append");
        assert!(db
            .has_recent_natural_entry("clm-1", ActionType::Escalation, "stalled:", 7)
            .expect("check"));
        assert!(!db
            .has_recent_natural_entry("clm-1", ActionType::Escalation, "deadline:", 7)
            .expect("check"));

        // Age the entry past the window
        db.conn_ref()
            .execute(
                "UPDATE action_log SET executed_at = datetime('now', '-8 days')
                 WHERE claim_id = 'clm-1'",
                [],
            )
            .expect("age");
        assert!(!db
            .has_recent_natural_entry("clm-1", ActionType::Escalation, "stalled:", 7)
            .expect("check"));
    }
}
