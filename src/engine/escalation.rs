//! Urgency escalation: stalled claims and imminent carrier deadlines.
//!
//! Both detectors are detect-and-log. The natural-key index makes each
//! condition surface once (per window for stalls, ever for a given deadline)
//! so staff see one escalation per problem, not one per tick.

use chrono::{NaiveDate, Utc};
use serde_json::json;

use crate::config::EngineConfig;
use crate::db::types::{ActionType, DbClaim, NewLogEntry, DATE_FORMAT};
use crate::db::ClaimDb;
use crate::deadline::{classify, days_until};
use crate::error::EngineError;

/// Raise escalation entries for this claim. Returns how many new entries
/// were written.
pub fn detect_escalations(
    db: &ClaimDb,
    claim: &DbClaim,
    cfg: &EngineConfig,
) -> Result<u32, EngineError> {
    let mut raised = 0;
    let today = Utc::now().date_naive();

    if db.is_claim_stalled(&claim.id, cfg.stalled_claim_days)?
        && !db.has_recent_natural_entry(
            &claim.id,
            ActionType::Escalation,
            "stalled:",
            cfg.stalled_claim_days,
        )?
    {
        let logged = db.append_log(&NewLogEntry {
            claim_id: &claim.id,
            action_type: ActionType::Escalation,
            details: json!({
                "reason": "stalled_claim",
                "window_days": cfg.stalled_claim_days,
            }),
            was_auto_executed: true,
            result: "raised",
            natural_key: Some(format!("stalled:{}", today.format(DATE_FORMAT))),
            trigger_source: "engine",
        })?;
        if logged {
            log::info!(
                "Claim {} stalled for {} days, escalation raised",
                claim.id,
                cfg.stalled_claim_days
            );
            raised += 1;
        }
    }

    for deadline in db.get_urgent_deadlines_for_claim(&claim.id, cfg.deadline_horizon_days)? {
        let date = match NaiveDate::parse_from_str(&deadline.deadline_date, DATE_FORMAT) {
            Ok(date) => date,
            Err(e) => {
                log::warn!(
                    "Deadline {} on claim {} has unparseable date {:?}: {}",
                    deadline.id,
                    claim.id,
                    deadline.deadline_date,
                    e
                );
                continue;
            }
        };
        let days = days_until(today, date);
        let urgency = classify(days);
        let logged = db.append_log(&NewLogEntry {
            claim_id: &claim.id,
            action_type: ActionType::Escalation,
            details: json!({
                "reason": "deadline_approaching",
                "deadline_id": deadline.id,
                "deadline_type": deadline.deadline_type,
                "deadline_date": deadline.deadline_date,
                "days_until": days,
                "urgency": urgency.as_str(),
                "bad_faith_potential": days < 0,
            }),
            was_auto_executed: true,
            result: "raised",
            natural_key: Some(format!("deadline:{}", deadline.id)),
            trigger_source: "engine",
        })?;
        if logged {
            log::info!(
                "Deadline {} ({}) on claim {} is {}, escalation raised",
                deadline.id,
                deadline.deadline_type,
                claim.id,
                urgency.as_str()
            );
            raised += 1;
        }
    }

    Ok(raised)
}

#[cfg(test)]
mod tests {
    use chrono::Days;

    use super::*;
    use crate::db::test_utils::{seed_claim, test_db};

    fn claim_row(db: &ClaimDb, id: &str) -> DbClaim {
        seed_claim(db, id);
        db.get_claim(id).expect("query").expect("claim")
    }

    fn escalation_count(db: &ClaimDb) -> i64 {
        db.conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM action_log WHERE action_type = 'escalation'",
                [],
                |r| r.get(0),
            )
            .expect("count")
    }

    #[test]
    fn test_deadline_escalates_once_ever() {
        let db = test_db();
        let claim = claim_row(&db, "clm-1");
        let today = Utc::now().date_naive();
        db.insert_deadline("clm-1", "proof_of_loss_response", today, 2, false)
            .expect("dl");

        let cfg = EngineConfig::default();
        assert_eq!(detect_escalations(&db, &claim, &cfg).expect("first"), 1);
        assert_eq!(detect_escalations(&db, &claim, &cfg).expect("second"), 0);
        assert_eq!(escalation_count(&db), 1);
    }

    #[test]
    fn test_overdue_deadline_flags_bad_faith() {
        let db = test_db();
        let claim = claim_row(&db, "clm-1");
        let today = Utc::now().date_naive();
        // Triggered five days back with a three-day offset: two days overdue
        db.insert_deadline("clm-1", "acknowledgment", today - Days::new(5), 3, false)
            .expect("dl");

        let cfg = EngineConfig::default();
        assert_eq!(detect_escalations(&db, &claim, &cfg).expect("run"), 1);

        let details: String = db
            .conn_ref()
            .query_row(
                "SELECT details FROM action_log WHERE action_type = 'escalation'",
                [],
                |r| r.get(0),
            )
            .expect("row");
        let details: serde_json::Value = serde_json::from_str(&details).expect("json");
        assert_eq!(details["urgency"], "overdue");
        assert_eq!(details["days_until"], -2);
        assert_eq!(details["bad_faith_potential"], true);
    }

    #[test]
    fn test_stalled_claim_escalates_once_per_window() {
        let db = test_db();
        let claim = claim_row(&db, "clm-1");
        db.conn_ref()
            .execute(
                "UPDATE claims SET updated_at = '2020-01-01 00:00:00' WHERE id = 'clm-1'",
                [],
            )
            .expect("age");

        let cfg = EngineConfig::default();
        assert_eq!(detect_escalations(&db, &claim, &cfg).expect("first"), 1);
        // Still stalled, but inside the suppression window
        assert_eq!(detect_escalations(&db, &claim, &cfg).expect("second"), 0);
        assert_eq!(escalation_count(&db), 1);

        let key: Option<String> = db
            .conn_ref()
            .query_row(
                "SELECT natural_key FROM action_log WHERE action_type = 'escalation'",
                [],
                |r| r.get(0),
            )
            .expect("row");
        assert!(key.expect("key").starts_with("stalled:"));
    }

    #[test]
    fn test_recent_correspondence_clears_the_stall() {
        let db = test_db();
        let claim = claim_row(&db, "clm-1");
        db.conn_ref()
            .execute(
                "UPDATE claims SET updated_at = '2020-01-01 00:00:00' WHERE id = 'clm-1'",
                [],
            )
            .expect("age");
        db.record_correspondence("clm-1", "inbound", Some("Checking in"))
            .expect("corr");

        let cfg = EngineConfig::default();
        assert_eq!(detect_escalations(&db, &claim, &cfg).expect("run"), 0);
        assert_eq!(escalation_count(&db), 0);
    }
}
