use rusqlite::params;

use super::*;

impl ClaimDb {
    // =========================================================================
    // Pending actions (drafted correspondence awaiting send or approval)
    // =========================================================================

    fn map_pending_row(row: &rusqlite::Row) -> rusqlite::Result<PendingAction> {
        Ok(PendingAction {
            id: row.get(0)?,
            claim_id: row.get(1)?,
            action_type: row.get(2)?,
            recipient_email: row.get(3)?,
            recipient_name: row.get(4)?,
            subject: row.get(5)?,
            body: row.get(6)?,
            status: row.get(7)?,
            auto_executed: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    /// Record a drafted email response. Drafts land here from the CRM's
    /// drafting surface; the dispatcher drains them on autonomous claims.
    pub fn create_pending_action(
        &self,
        claim_id: &str,
        recipient_email: &str,
        recipient_name: Option<&str>,
        subject: &str,
        body: &str,
    ) -> Result<String, DbError> {
        let id = format!("pa-{}", uuid::Uuid::new_v4());
        self.conn.execute(
            "INSERT INTO pending_actions
                (id, claim_id, recipient_email, recipient_name, subject, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, claim_id, recipient_email, recipient_name, subject, body],
        )?;
        Ok(id)
    }

    /// Transition a draft to sent. Only fires while the draft is still
    /// pending, so a concurrent approval cannot double-send.
    pub fn mark_pending_sent(&self, id: &str, auto_executed: bool) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE pending_actions
             SET status = 'sent',
                 auto_executed = ?2,
                 updated_at = datetime('now')
             WHERE id = ?1 AND status = 'pending'",
            params![id, auto_executed],
        )?;
        Ok(changed > 0)
    }

    /// Email drafts the dispatcher may act on, oldest first so the queue
    /// drains in the order drafts were written.
    pub fn get_dispatchable_actions(&self, claim_id: &str) -> Result<Vec<PendingAction>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, claim_id, action_type, recipient_email, recipient_name,
                    subject, body, status, auto_executed, created_at
             FROM pending_actions
             WHERE claim_id = ?1 AND action_type = 'email_response' AND status = 'pending'
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![claim_id], Self::map_pending_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }
}
