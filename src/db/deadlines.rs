use chrono::NaiveDate;
use rusqlite::params;

use crate::deadline::compute_deadline_date;

use super::*;

impl ClaimDb {
    // =========================================================================
    // Carrier deadlines
    // =========================================================================

    fn map_deadline_row(row: &rusqlite::Row) -> rusqlite::Result<CarrierDeadline> {
        Ok(CarrierDeadline {
            id: row.get(0)?,
            claim_id: row.get(1)?,
            deadline_type: row.get(2)?,
            trigger_date: row.get(3)?,
            offset_days: row.get(4)?,
            is_business_days: row.get(5)?,
            deadline_date: row.get(6)?,
            status: row.get(7)?,
            carrier_response_date: row.get(8)?,
        })
    }

    /// Create a deadline, deriving its concrete date from the trigger and
    /// offset definition.
    pub fn insert_deadline(
        &self,
        claim_id: &str,
        deadline_type: &str,
        trigger_date: NaiveDate,
        offset_days: i64,
        is_business_days: bool,
    ) -> Result<String, DbError> {
        let id = format!("dl-{}", uuid::Uuid::new_v4());
        let deadline_date = compute_deadline_date(trigger_date, offset_days, is_business_days);
        self.conn.execute(
            "INSERT INTO carrier_deadlines
                (id, claim_id, deadline_type, trigger_date, offset_days,
                 is_business_days, deadline_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                claim_id,
                deadline_type,
                trigger_date.format(DATE_FORMAT).to_string(),
                offset_days,
                is_business_days,
                deadline_date.format(DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(id)
    }

    /// Pending deadlines for a claim that are overdue or fall within the
    /// horizon, soonest first.
    pub fn get_urgent_deadlines_for_claim(
        &self,
        claim_id: &str,
        horizon_days: i64,
    ) -> Result<Vec<CarrierDeadline>, DbError> {
        let horizon = format!("+{horizon_days} days");
        let mut stmt = self.conn.prepare(
            "SELECT id, claim_id, deadline_type, trigger_date, offset_days,
                    is_business_days, deadline_date, status, carrier_response_date
             FROM carrier_deadlines
             WHERE claim_id = ?1
               AND status = 'pending'
               AND deadline_date <= date('now', ?2)
             ORDER BY deadline_date, id",
        )?;
        let rows = stmt.query_map(params![claim_id, horizon], Self::map_deadline_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Close a deadline once the carrier has responded.
    pub fn mark_deadline_met(&self, id: &str, response_date: NaiveDate) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE carrier_deadlines
             SET status = 'met', carrier_response_date = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, response_date.format(DATE_FORMAT).to_string()],
        )?;
        Ok(changed > 0)
    }
}
