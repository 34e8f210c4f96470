use rusqlite::params;

use super::*;

impl ClaimDb {
    // =========================================================================
    // Claims and claim activity
    // =========================================================================

    fn map_claim_row(row: &rusqlite::Row) -> rusqlite::Result<DbClaim> {
        Ok(DbClaim {
            id: row.get(0)?,
            claim_number: row.get(1)?,
            policy_number: row.get(2)?,
            status: row.get(3)?,
            loss_type: row.get(4)?,
            adjuster_name: row.get(5)?,
            adjuster_email: row.get(6)?,
            policyholder_name: row.get(7)?,
            policyholder_email: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    pub fn get_claim(&self, id: &str) -> Result<Option<DbClaim>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, claim_number, policy_number, status, loss_type,
                    adjuster_name, adjuster_email, policyholder_name,
                    policyholder_email, created_at, updated_at
             FROM claims WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::map_claim_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Append a line to the claim's activity feed and refresh `updated_at`
    /// so staleness checks see the engine's own work as activity.
    pub fn add_claim_activity(&self, claim_id: &str, description: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO claim_activity (claim_id, description) VALUES (?1, ?2)",
            params![claim_id, description],
        )?;
        self.conn.execute(
            "UPDATE claims SET updated_at = datetime('now') WHERE id = ?1",
            params![claim_id],
        )?;
        Ok(())
    }

    /// A claim is stalled when neither its record, its activity feed, nor its
    /// correspondence has moved within the window.
    pub fn is_claim_stalled(&self, claim_id: &str, window_days: i64) -> Result<bool, DbError> {
        let cutoff = format!("-{window_days} days");
        let stalled: bool = self.conn.query_row(
            "SELECT (SELECT updated_at FROM claims WHERE id = ?1) < datetime('now', ?2)
                AND NOT EXISTS (
                    SELECT 1 FROM claim_activity
                    WHERE claim_id = ?1 AND created_at >= datetime('now', ?2))
                AND NOT EXISTS (
                    SELECT 1 FROM correspondence
                    WHERE claim_id = ?1 AND received_at >= datetime('now', ?2))",
            params![claim_id, cutoff],
            |row| row.get(0),
        )?;
        Ok(stalled)
    }

    // =========================================================================
    // Correspondence
    // =========================================================================

    pub fn record_correspondence(
        &self,
        claim_id: &str,
        direction: &str,
        subject: Option<&str>,
    ) -> Result<String, DbError> {
        let id = format!("corr-{}", uuid::Uuid::new_v4());
        self.conn.execute(
            "INSERT INTO correspondence (id, claim_id, direction, subject)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, claim_id, direction, subject],
        )?;
        Ok(id)
    }

    /// Whether any inbound message arrived for the claim at or after `since`.
    pub fn has_inbound_since(&self, claim_id: &str, since: &str) -> Result<bool, DbError> {
        let found: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM correspondence
                WHERE claim_id = ?1 AND direction = 'inbound' AND received_at >= ?2)",
            params![claim_id, since],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Subject of the most recent outbound message, used to thread follow-ups.
    pub fn last_outbound_subject(&self, claim_id: &str) -> Result<Option<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT subject FROM correspondence
             WHERE claim_id = ?1 AND direction = 'outbound' AND subject IS NOT NULL
             ORDER BY received_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![claim_id], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{seed_claim, test_db};

    #[test]
    fn test_get_claim() {
        let db = test_db();
        seed_claim(&db, "clm-1");

        let claim = db.get_claim("clm-1").expect("query").expect("row");
        assert_eq!(claim.claim_number, "CLM-clm-1");
        assert_eq!(claim.adjuster_email.as_deref(), Some("dana@carrier.example"));

        assert!(db.get_claim("missing").expect("query").is_none());
    }

    #[test]
    fn test_activity_touches_claim() {
        let db = test_db();
        seed_claim(&db, "clm-1");
        db.conn_ref()
            .execute(
                "UPDATE claims SET updated_at = '2020-01-01 00:00:00' WHERE id = 'clm-1'",
                [],
            )
            .expect("age claim");

        db.add_claim_activity("clm-1", "Sent status request to carrier")
            .expect("activity");

        let claim = db.get_claim("clm-1").expect("query").expect("row");
        assert_ne!(claim.updated_at, "2020-01-01 00:00:00");

        let count: i64 = db
            .conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM claim_activity WHERE claim_id = 'clm-1'",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_stalled_detection_window() {
        let db = test_db();
        seed_claim(&db, "clm-1");

        // Fresh claim is not stalled
        assert!(!db.is_claim_stalled("clm-1", 7).expect("check"));

        // Age everything past the window
        db.conn_ref()
            .execute(
                "UPDATE claims SET updated_at = datetime('now', '-10 days') WHERE id = 'clm-1'",
                [],
            )
            .expect("age");
        assert!(db.is_claim_stalled("clm-1", 7).expect("check"));

        // Recent inbound mail revives it
        db.record_correspondence("clm-1", "inbound", Some("Re: estimate"))
            .expect("corr");
        assert!(!db.is_claim_stalled("clm-1", 7).expect("check"));
    }

    #[test]
    fn test_inbound_since_and_last_subject() {
        let db = test_db();
        seed_claim(&db, "clm-1");

        db.record_correspondence("clm-1", "outbound", Some("Claim CLM-1 status"))
            .expect("corr");
        assert!(!db
            .has_inbound_since("clm-1", "2020-01-01 00:00:00")
            .expect("check"));

        db.record_correspondence("clm-1", "inbound", Some("Re: Claim CLM-1 status"))
            .expect("corr");
        assert!(db
            .has_inbound_since("clm-1", "2020-01-01 00:00:00")
            .expect("check"));
        assert!(!db
            .has_inbound_since("clm-1", "2099-01-01 00:00:00")
            .expect("check"));

        assert_eq!(
            db.last_outbound_subject("clm-1").expect("query").as_deref(),
            Some("Claim CLM-1 status")
        );
        assert!(db.last_outbound_subject("clm-2").expect("query").is_none());
    }
}
