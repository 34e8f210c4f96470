//! Draft dispatch for fully autonomous claims.
//!
//! Drafts accumulate in `pending_actions` from the CRM's drafting surface.
//! On claims cleared for unattended sending the engine drains them, oldest
//! first. A draft that touches legal territory stays put and raises one
//! escalation for a human instead.

use serde_json::json;

use crate::clients::mail::{MailSender, OutboundEmail};
use crate::db::types::{ActionType, AutomationPolicy, DbClaim, NewLogEntry};
use crate::db::ClaimDb;
use crate::error::EngineError;

/// Phrases that always force human review, used when a policy carries no
/// list of its own.
pub const DEFAULT_KEYWORD_BLOCKERS: &[&str] = &[
    "lawsuit",
    "attorney",
    "bad faith",
    "litigation",
    "sue",
    "court",
    "complaint",
    "demand letter",
];

fn blocklist(policy: &AutomationPolicy) -> Vec<String> {
    if policy.keyword_blockers.is_empty() {
        DEFAULT_KEYWORD_BLOCKERS.iter().map(|k| k.to_string()).collect()
    } else {
        policy.keyword_blockers.iter().map(|k| k.to_lowercase()).collect()
    }
}

/// Case-insensitive substring scan over subject and body together.
pub fn find_blocked_keyword(blockers: &[String], subject: &str, body: &str) -> Option<String> {
    let haystack = format!("{subject}\n{body}").to_lowercase();
    blockers
        .iter()
        .find(|k| !k.is_empty() && haystack.contains(k.as_str()))
        .cloned()
}

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub sent: u32,
    pub blocked: u32,
}

/// Drain the claim's pending email drafts. Blocked drafts stay pending and
/// raise one escalation each; a transport failure leaves the draft for the
/// next tick without recording anything.
pub fn dispatch_pending(
    db: &ClaimDb,
    mailer: &dyn MailSender,
    claim: &DbClaim,
    policy: &AutomationPolicy,
) -> Result<DispatchOutcome, EngineError> {
    let mut outcome = DispatchOutcome::default();
    let blockers = blocklist(policy);

    for draft in db.get_dispatchable_actions(&claim.id)? {
        if let Some(keyword) = find_blocked_keyword(&blockers, &draft.subject, &draft.body) {
            let logged = db.append_log(&NewLogEntry {
                claim_id: &claim.id,
                action_type: ActionType::Escalation,
                details: json!({
                    "reason": "keyword_blocked",
                    "keyword": keyword,
                    "pending_action_id": draft.id,
                }),
                was_auto_executed: false,
                result: "blocked",
                natural_key: Some(format!("blocked:{}", draft.id)),
                trigger_source: "engine",
            })?;
            if logged {
                log::info!(
                    "Draft {} on claim {} blocked on \"{}\", held for review",
                    draft.id,
                    claim.id,
                    keyword
                );
                outcome.blocked += 1;
            }
            continue;
        }

        let email = OutboundEmail::new(
            &claim.id,
            &draft.recipient_email,
            draft.recipient_name.as_deref(),
            &draft.subject,
            &draft.body,
        );
        if let Err(e) = mailer.send(&email) {
            log::warn!(
                "Sending draft {} on claim {} failed: {}. Retrying next tick",
                draft.id,
                claim.id,
                e
            );
            continue;
        }
        // Status guard: only the writer that flips pending -> sent records.
        // The flip and its audit rows commit together or not at all.
        let recorded = db.with_transaction(|db| {
            if !db.mark_pending_sent(&draft.id, true)? {
                return Ok(false);
            }
            db.append_log(&NewLogEntry {
                claim_id: &claim.id,
                action_type: ActionType::EmailSent,
                details: json!({
                    "pending_action_id": draft.id,
                    "recipient": draft.recipient_email,
                    "subject": draft.subject,
                }),
                was_auto_executed: true,
                result: "sent",
                natural_key: None,
                trigger_source: "engine",
            })?;
            db.record_correspondence(&claim.id, "outbound", Some(&draft.subject))?;
            Ok(true)
        })?;
        if !recorded {
            continue;
        }
        log::info!("Dispatched draft {} on claim {}", draft.id, claim.id);
        outcome.sent += 1;
    }

    Ok(outcome)
}
