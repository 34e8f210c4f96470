//! Scheduled follow-up cadences.
//!
//! Two independent tracks per claim: a general status chase and a
//! recoverable depreciation chase that only runs while the claim sits in an
//! RD-flavored status. Bodies come from the drafting service; scheduling
//! state advances only after the mail provider accepts the send, so a failed
//! send retries on the next tick.

use crate::clients::drafter::DraftPrompt;
use crate::clients::mail::{intake_cc_address, OutboundEmail};
use crate::config::EngineConfig;
use crate::db::types::{AutomationPolicy, DbClaim, TrackKind};
use crate::db::ClaimDb;
use crate::engine::Collaborators;
use crate::error::EngineError;

/// Status strings that put a claim in recoverable depreciation territory.
/// Matched fuzzily in both directions, so a bare "RD" status hits
/// "rd requested" and a verbose status hits "depreciation".
pub const RD_STATUS_MARKERS: &[&str] = &[
    "rd requested",
    "rd pending",
    "rd approved",
    "recoverable depreciation",
    "depreciation",
];

pub fn status_matches_rd(status: &str) -> bool {
    let status = status.trim().to_lowercase();
    // One-letter statuses would match almost anything in reverse
    if status.len() < 2 {
        return false;
    }
    RD_STATUS_MARKERS
        .iter()
        .any(|m| status.contains(m) || m.contains(status.as_str()))
}

/// What a due track did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Sent,
    Stopped,
    Skipped,
}

/// Run one due follow-up track for one claim.
pub fn run_track(
    db: &ClaimDb,
    cfg: &EngineConfig,
    collabs: &Collaborators,
    policy: &AutomationPolicy,
    kind: TrackKind,
) -> Result<TrackOutcome, EngineError> {
    let claim = db
        .get_claim(&policy.claim_id)?
        .ok_or_else(|| EngineError::ClaimMissing(policy.claim_id.clone()))?;

    if claim.status.eq_ignore_ascii_case("closed") {
        db.stop_follow_up(&claim.id, kind, "claim_closed")?;
        db.add_claim_activity(
            &claim.id,
            &format!("Stopped {} follow-ups: claim closed", label(kind)),
        )?;
        log::info!("Claim {} closed, {} follow-ups stopped", claim.id, kind.as_str());
        return Ok(TrackOutcome::Stopped);
    }

    if kind == TrackKind::RecoverableDepreciation && !status_matches_rd(&claim.status) {
        log::debug!(
            "Claim {} status {:?} is not RD-related, skipping",
            claim.id,
            claim.status
        );
        return Ok(TrackOutcome::Skipped);
    }

    let track = policy.track(kind);
    if track.current_count >= track.max_count {
        db.stop_follow_up(&claim.id, kind, "max_count_reached")?;
        log::info!(
            "{} follow-ups on claim {} hit the cap of {}, track stopped",
            kind.as_str(),
            claim.id,
            track.max_count
        );
        return Ok(TrackOutcome::Stopped);
    }

    let Some((email, name)) = recipient_for(&claim, kind) else {
        return match kind {
            TrackKind::RecoverableDepreciation => {
                log::debug!("Claim {} has no adjuster email, skipping RD follow-up", claim.id);
                Ok(TrackOutcome::Skipped)
            }
            TrackKind::General => Err(EngineError::NoRecipient(claim.id.clone())),
        };
    };
    let email = email.to_string();
    let name = name.map(str::to_string);

    let sequence = track.current_count + 1;
    let last_subject = match kind {
        TrackKind::General => db.last_outbound_subject(&claim.id)?,
        TrackKind::RecoverableDepreciation => None,
    };

    let prompt = build_prompt(&claim, kind, sequence, last_subject.as_deref());
    let body = collabs
        .drafter
        .draft(&prompt)
        .map_err(|e| EngineError::collab("drafter", e))?;

    let subject = subject_for(&claim, kind, last_subject.as_deref());
    let cc = if cfg.intake_domain.is_empty() {
        None
    } else {
        Some(intake_cc_address(
            claim.policy_number.as_deref(),
            &claim.id,
            &cfg.intake_domain,
        ))
    };
    let outbound =
        OutboundEmail::new(&claim.id, &email, name.as_deref(), &subject, &body).with_intake_cc(cc);
    collabs
        .mailer
        .send(&outbound)
        .map_err(|e| EngineError::collab("mail", e))?;

    // Only an accepted send advances the cadence
    let (new_count, stopped) = db.record_follow_up_sent(&claim.id, kind)?;
    db.record_correspondence(&claim.id, "outbound", Some(&subject))?;
    db.add_claim_activity(
        &claim.id,
        &format!("Sent {} follow-up #{} to {}", label(kind), new_count, email),
    )?;

    if kind == TrackKind::RecoverableDepreciation && new_count == 1 {
        // Due when the next chase would go out, so staff verify the payment
        // landed before we nag the carrier again
        let due = db
            .get_policy(&claim.id)?
            .and_then(|p| p.recoverable_depreciation.next_run_at);
        db.create_task(
            &claim.id,
            &format!(
                "Verify recoverable depreciation payment for claim {}",
                claim.claim_number
            ),
            due.as_deref(),
        )?;
    }

    if stopped {
        log::info!(
            "{} follow-up #{} on claim {} was the last, track stopped at its cap",
            kind.as_str(),
            new_count,
            claim.id
        );
    } else {
        log::info!("Sent {} follow-up #{} on claim {}", kind.as_str(), new_count, claim.id);
    }
    Ok(TrackOutcome::Sent)
}

fn label(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::General => "general",
        TrackKind::RecoverableDepreciation => "recoverable depreciation",
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Adjuster first; the general track may fall back to the policyholder, the
/// RD chase only makes sense aimed at the carrier's adjuster.
fn recipient_for(claim: &DbClaim, kind: TrackKind) -> Option<(&str, Option<&str>)> {
    let adjuster = non_blank(claim.adjuster_email.as_deref())
        .map(|e| (e, non_blank(claim.adjuster_name.as_deref())));
    match kind {
        TrackKind::RecoverableDepreciation => adjuster,
        TrackKind::General => adjuster.or_else(|| {
            non_blank(claim.policyholder_email.as_deref())
                .map(|e| (e, non_blank(claim.policyholder_name.as_deref())))
        }),
    }
}

fn build_prompt(
    claim: &DbClaim,
    kind: TrackKind,
    sequence: i64,
    last_subject: Option<&str>,
) -> DraftPrompt {
    let mut context = format!(
        "Claim number: {}\nStatus: {}",
        claim.claim_number, claim.status
    );
    if let Some(loss) = non_blank(claim.loss_type.as_deref()) {
        context.push_str(&format!("\nLoss type: {loss}"));
    }
    if let Some(holder) = non_blank(claim.policyholder_name.as_deref()) {
        context.push_str(&format!("\nPolicyholder: {holder}"));
    }

    let user = match kind {
        TrackKind::General => {
            let mut user = format!(
                "Write follow-up #{sequence} asking for a status update on this claim.\n{context}"
            );
            if let Some(subject) = last_subject {
                user.push_str(&format!("\nOur last message had the subject {subject:?}."));
            }
            user.push_str("\nKeep it brief and courteous, and ask for a concrete next step.");
            user
        }
        TrackKind::RecoverableDepreciation => format!(
            "Write follow-up #{sequence} asking the carrier to release the recoverable \
             depreciation payment on this claim.\n{context}\nRequest a payment date."
        ),
    };

    DraftPrompt {
        system: "You draft professional correspondence for an insurance claims office. \
                 Reply with the message body only, no subject line and no signature block."
            .to_string(),
        user,
    }
}

fn subject_for(claim: &DbClaim, kind: TrackKind, last_subject: Option<&str>) -> String {
    match kind {
        TrackKind::General => match last_subject {
            Some(prev) => format!("Re: {}", prev.trim_start_matches("Re: ").trim()),
            None => format!("Follow-Up: Claim {}", claim.claim_number),
        },
        TrackKind::RecoverableDepreciation => format!(
            "Recoverable Depreciation Follow-Up: Claim {}",
            claim.claim_number
        ),
    }
}
