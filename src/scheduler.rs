//! Cron-driven tick scheduling.
//!
//! Polls once a minute, fires schedules that have come due, and watches for
//! wall-clock jumps (laptop sleep, VM pause) so a run missed inside the
//! grace window still happens after wake. External cron services hitting the
//! HTTP triggers can coexist with this loop; the per-kind tick lock and the
//! engine's natural keys make a double fire harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::config::ScheduleEntry;
use crate::error::EngineError;
use crate::state::{AppState, TickError};
use crate::types::TickKind;

/// Grace period for missed runs (2 hours)
const MISSED_RUN_GRACE_PERIOD_SECS: i64 = 7200;

/// Time jump threshold to detect sleep/wake (5 minutes)
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// Poll interval for the scheduler loop (1 minute)
const POLL_INTERVAL_SECS: u64 = 60;

pub struct Scheduler {
    state: Arc<AppState>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Run the scheduler loop indefinitely.
    pub async fn run(&self) {
        let mut last_check = Utc::now();

        loop {
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;

            let now = Utc::now();

            let time_jump = (now - last_check).num_seconds();
            if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Detected system wake (time jumped {} seconds), checking for missed runs",
                    time_jump
                );
                self.check_missed_runs(now).await;
            }

            self.check_due_runs(now).await;

            last_check = now;
        }
    }

    async fn check_due_runs(&self, now: DateTime<Utc>) {
        for kind in [TickKind::Engine, TickKind::FollowUp] {
            let entry = self.schedule_for(kind);
            if !entry.enabled {
                continue;
            }
            match should_run_now(entry, self.state.get_last_scheduled_run(kind), now) {
                Ok(true) => self.fire(kind, now, "scheduled").await,
                Ok(false) => {}
                Err(e) => log::warn!("{} schedule unusable: {}", kind.as_str(), e),
            }
        }
    }

    async fn check_missed_runs(&self, now: DateTime<Utc>) {
        for kind in [TickKind::Engine, TickKind::FollowUp] {
            let entry = self.schedule_for(kind);
            if !entry.enabled {
                continue;
            }
            match find_missed_run(entry, self.state.get_last_scheduled_run(kind), now) {
                Ok(Some(missed)) => {
                    log::info!(
                        "Found missed {} run scheduled for {}, running now",
                        kind.as_str(),
                        missed
                    );
                    self.fire(kind, now, "missed").await;
                }
                Ok(None) => {}
                Err(e) => log::warn!("{} schedule unusable: {}", kind.as_str(), e),
            }
        }
    }

    fn schedule_for(&self, kind: TickKind) -> &ScheduleEntry {
        match kind {
            TickKind::Engine => &self.state.config.schedules.engine,
            TickKind::FollowUp => &self.state.config.schedules.follow_up,
        }
    }

    async fn fire(&self, kind: TickKind, now: DateTime<Utc>, trigger: &str) {
        // Stamp before running so a failed tick is not re-fired every poll
        self.state.set_last_scheduled_run(kind, now);
        match self.state.execute_tick(kind).await {
            Ok(summary) => log::info!(
                "{} {} run {} finished with {} error(s)",
                trigger,
                kind.as_str(),
                summary.run_id,
                summary.errors.len()
            ),
            Err(TickError::AlreadyRunning) => log::warn!(
                "{} tick already running, skipping {} trigger",
                kind.as_str(),
                trigger
            ),
            Err(TickError::Failed(msg)) => {
                log::error!("{} tick failed: {}", kind.as_str(), msg)
            }
        }
    }
}

/// Parse a cron expression. The cron crate wants six fields with seconds;
/// config entries use the common five-field form.
pub fn parse_cron(expr: &str) -> Result<Schedule, EngineError> {
    let full_expr = format!("0 {}", expr);
    full_expr.parse::<Schedule>().map_err(|e| {
        EngineError::Configuration(format!("Invalid cron expression '{}': {}", expr, e))
    })
}

fn parse_tz(entry: &ScheduleEntry) -> Result<Tz, EngineError> {
    entry
        .timezone
        .parse()
        .map_err(|_| EngineError::Configuration(format!("Invalid timezone: {}", entry.timezone)))
}

/// Whether the entry's schedule has a slot within two minutes of `now` that
/// has not already fired.
pub fn should_run_now(
    entry: &ScheduleEntry,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz = parse_tz(entry)?;

    let now_local = now.with_timezone(&tz);
    let mut upcoming = schedule.after(&(now_local - chrono::Duration::minutes(2)));

    if let Some(next_time) = upcoming.next() {
        let next_utc = next_time.with_timezone(&Utc);
        let diff = (now - next_utc).num_seconds().abs();

        // Two-minute window tolerates poll jitter around the slot
        if diff < 120 {
            if let Some(last) = last_run {
                if (last - next_utc).num_seconds().abs() < 60 {
                    return Ok(false); // Already ran this slot
                }
            }
            return Ok(true);
        }
    }

    Ok(false)
}

/// Find a slot inside the grace period that never fired.
pub fn find_missed_run(
    entry: &ScheduleEntry,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, EngineError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz = parse_tz(entry)?;

    let now_local = now.with_timezone(&tz);
    let grace_start = now_local - chrono::Duration::seconds(MISSED_RUN_GRACE_PERIOD_SECS);

    for scheduled in schedule.after(&grace_start) {
        let scheduled_utc = scheduled.with_timezone(&Utc);
        if scheduled_utc > now {
            break;
        }
        if let Some(last) = last_run {
            if last >= scheduled_utc {
                continue; // Already ran
            }
        }
        return Ok(Some(scheduled_utc));
    }

    Ok(None)
}

/// Next time this entry fires. Used for startup logging.
pub fn next_run_time(entry: &ScheduleEntry) -> Result<DateTime<Utc>, EngineError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz = parse_tz(entry)?;

    let next = schedule
        .upcoming(tz)
        .next()
        .ok_or_else(|| EngineError::Configuration("No upcoming scheduled time".to_string()))?;

    Ok(next.with_timezone(&Utc))
}
