//! Claim automation batch engine.
//!
//! Two entry points, one per cadence: [`run_engine_tick`] does the
//! quota-gated per-claim work (task completion, dispatch, escalation) plus
//! the document drain, and [`run_follow_up_tick`] advances both follow-up
//! cadences. Both walk claims sequentially, isolate per-claim failures into
//! the run's error list, and persist a summary row when they finish; the
//! worst outcome of any tick is a run that processed nothing and says why.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clients::classifier::DocumentClassifier;
use crate::clients::drafter::Drafter;
use crate::clients::mail::MailSender;
use crate::config::EngineConfig;
use crate::db::types::{AutomationPolicy, AutonomyLevel, TrackKind};
use crate::db::ClaimDb;
use crate::error::EngineError;
use crate::types::{TickKind, TickSummary};

pub mod dispatch;
pub mod documents;
pub mod escalation;
pub mod followup;
pub mod tasks;

/// The outbound services a tick may call, behind their seams.
#[derive(Clone)]
pub struct Collaborators {
    pub mailer: Arc<dyn MailSender>,
    pub drafter: Arc<dyn Drafter>,
    pub classifier: Arc<dyn DocumentClassifier>,
}

/// One engine pass: every active policy, quota-gated, then the document
/// drain. Claims are processed sequentially so the quota read-then-act stays
/// simple and outbound concurrency stays bounded.
pub fn run_engine_tick(db: &ClaimDb, cfg: &EngineConfig, collabs: &Collaborators) -> TickSummary {
    let mut summary = TickSummary::begin(TickKind::Engine);
    let budget = Duration::from_secs(cfg.tick_deadline_secs);
    let started = Instant::now();

    let policies = match db.load_active_policies() {
        Ok(policies) => policies,
        Err(e) => {
            summary.record_error("policies", e);
            finish_run(db, &mut summary);
            return summary;
        }
    };
    log::info!(
        "Engine tick {}: {} active automation policies",
        summary.run_id,
        policies.len()
    );

    let mut out_of_time = false;
    for policy in &policies {
        if started.elapsed() >= budget {
            out_of_time = true;
            break;
        }
        match process_claim(db, cfg, collabs, policy, &mut summary) {
            Ok(true) => summary.claims_processed += 1,
            Ok(false) => {}
            Err(e) => summary.record_error(&policy.claim_id, e),
        }
    }

    if out_of_time {
        summary.record_error("tick", EngineError::TickDeadline(cfg.tick_deadline_secs));
    } else {
        // Bounded work unit, independent of the per-claim quota
        documents::process_unclassified(
            db,
            collabs.classifier.as_ref(),
            cfg.document_batch_size,
            &mut summary,
        );
    }

    finish_run(db, &mut summary);
    summary
}

/// Runs every enabled automation for one claim, in the fixed order task
/// completion → dispatch → escalation, so a task closed by inbound mail is
/// reflected before the stall check. Returns whether the claim received a
/// pass; closed and quota-exhausted claims are skipped.
fn process_claim(
    db: &ClaimDb,
    cfg: &EngineConfig,
    collabs: &Collaborators,
    policy: &AutomationPolicy,
    summary: &mut TickSummary,
) -> Result<bool, EngineError> {
    let claim = db
        .get_claim(&policy.claim_id)?
        .ok_or_else(|| EngineError::ClaimMissing(policy.claim_id.clone()))?;

    if claim.status.eq_ignore_ascii_case("closed") {
        log::debug!("Claim {} is closed, skipping", claim.id);
        return Ok(false);
    }

    // The quota is global per claim per day, not per action type
    let used = db.count_auto_actions_today(&claim.id)?;
    if used >= policy.daily_action_limit {
        log::debug!(
            "Claim {} at its daily action limit ({}/{}), skipping",
            claim.id,
            used,
            policy.daily_action_limit
        );
        return Ok(false);
    }

    if policy.auto_complete_tasks {
        summary.tasks_completed += tasks::auto_complete_tasks(db, &claim)?;
    }

    // Dispatch needs the flag and full autonomy; semi-autonomous claims keep
    // their drafts for human approval.
    if policy.auto_respond_without_approval
        && policy.autonomy_level == AutonomyLevel::FullyAutonomous
    {
        let outcome = dispatch::dispatch_pending(db, collabs.mailer.as_ref(), &claim, policy)?;
        summary.emails_sent += outcome.sent;
        summary.escalations += outcome.blocked;
    }

    if policy.auto_escalate_urgency {
        summary.escalations += escalation::detect_escalations(db, &claim, cfg)?;
    }

    Ok(true)
}

/// One pass over both follow-up cadences. Follow-ups deliberately bypass the
/// daily action quota; the per-track caps are their own rate limit.
pub fn run_follow_up_tick(
    db: &ClaimDb,
    cfg: &EngineConfig,
    collabs: &Collaborators,
) -> TickSummary {
    let mut summary = TickSummary::begin(TickKind::FollowUp);
    let budget = Duration::from_secs(cfg.tick_deadline_secs);
    let started = Instant::now();

    'tracks: for kind in [TrackKind::General, TrackKind::RecoverableDepreciation] {
        let due = match db.load_due_follow_ups(kind) {
            Ok(due) => due,
            Err(e) => {
                summary.record_error("policies", e);
                continue;
            }
        };
        if !due.is_empty() {
            log::info!("{} {} follow-ups due", due.len(), kind.as_str());
        }
        for policy in &due {
            if started.elapsed() >= budget {
                summary.record_error("tick", EngineError::TickDeadline(cfg.tick_deadline_secs));
                break 'tracks;
            }
            match followup::run_track(db, cfg, collabs, policy, kind) {
                Ok(outcome) => {
                    summary.claims_processed += 1;
                    if outcome == followup::TrackOutcome::Sent {
                        summary.emails_sent += 1;
                    }
                }
                Err(e) => summary.record_error(&policy.claim_id, e),
            }
        }
    }

    finish_run(db, &mut summary);
    summary
}

fn finish_run(db: &ClaimDb, summary: &mut TickSummary) {
    summary.finish();
    log::info!(
        "{} tick {} finished: {} claims, {} tasks completed, {} emails, {} escalations, {} documents, {} errors",
        summary.kind.as_str(),
        summary.run_id,
        summary.claims_processed,
        summary.tasks_completed,
        summary.emails_sent,
        summary.escalations,
        summary.documents_processed,
        summary.errors.len()
    );
    if let Err(e) = db.record_run(summary) {
        log::error!("Failed to persist run {}: {}", summary.run_id, e);
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
