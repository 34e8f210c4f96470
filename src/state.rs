//! Shared runtime state: configuration, outbound collaborators, per-tick
//! locks, and scheduler bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::clients::classifier::{Classification, DocumentClassifier, HttpClassifier};
use crate::clients::drafter::{DraftPrompt, Drafter, HttpDrafter};
use crate::clients::mail::{HttpMailer, MailSender, OutboundEmail};
use crate::clients::CollabError;
use crate::config::Config;
use crate::db::ClaimDb;
use crate::engine::{self, Collaborators};
use crate::types::{TickKind, TickSummary};

pub struct AppState {
    pub config: Config,
    pub collaborators: Collaborators,
    engine_tick: tokio::sync::Mutex<()>,
    follow_up_tick: tokio::sync::Mutex<()>,
    last_scheduled_run: Mutex<HashMap<TickKind, DateTime<Utc>>>,
}

/// Why a triggered tick produced no summary.
#[derive(Debug)]
pub enum TickError {
    AlreadyRunning,
    Failed(String),
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let collaborators = build_collaborators(&config);
        Self {
            config,
            collaborators,
            engine_tick: tokio::sync::Mutex::new(()),
            follow_up_tick: tokio::sync::Mutex::new(()),
            last_scheduled_run: Mutex::new(HashMap::new()),
        }
    }

    /// Run one tick, holding that kind's lock for the duration. A concurrent
    /// trigger of the same kind is rejected, not queued: an overlapping run
    /// would double up on quota reads and follow-up advances. The two kinds
    /// run independently of each other.
    pub async fn execute_tick(self: &Arc<Self>, kind: TickKind) -> Result<TickSummary, TickError> {
        let lock = match kind {
            TickKind::Engine => &self.engine_tick,
            TickKind::FollowUp => &self.follow_up_tick,
        };
        let Ok(_guard) = lock.try_lock() else {
            return Err(TickError::AlreadyRunning);
        };

        let state = self.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let db = ClaimDb::open().map_err(|e| TickError::Failed(e.to_string()))?;
            Ok(match kind {
                TickKind::Engine => {
                    engine::run_engine_tick(&db, &state.config.engine, &state.collaborators)
                }
                TickKind::FollowUp => {
                    engine::run_follow_up_tick(&db, &state.config.engine, &state.collaborators)
                }
            })
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(e) => Err(TickError::Failed(format!("tick task panicked: {e}"))),
        }
    }

    pub fn set_last_scheduled_run(&self, kind: TickKind, time: DateTime<Utc>) {
        if let Ok(mut guard) = self.last_scheduled_run.lock() {
            guard.insert(kind, time);
        }
    }

    pub fn get_last_scheduled_run(&self, kind: TickKind) -> Option<DateTime<Utc>> {
        self.last_scheduled_run
            .lock()
            .ok()
            .and_then(|guard| guard.get(&kind).copied())
    }
}

/// Build the live collaborator set. A service with no endpoint configured is
/// wired to a stub that fails with `Misconfigured` at call time, so the rest
/// of the engine keeps working and the gap shows up in run summaries.
fn build_collaborators(config: &Config) -> Collaborators {
    let services = &config.services;

    let mailer: Arc<dyn MailSender> = match HttpMailer::new(
        &services.mail.endpoint,
        &services.mail.api_key,
        services.mail.timeout_secs,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::warn!("Mail sending unavailable: {e}");
            Arc::new(Unconfigured("mail"))
        }
    };

    let drafter: Arc<dyn Drafter> = match HttpDrafter::new(
        &services.drafter.endpoint,
        &services.drafter.api_key,
        services.drafter.timeout_secs,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::warn!("Drafting unavailable: {e}");
            Arc::new(Unconfigured("drafting"))
        }
    };

    let classifier: Arc<dyn DocumentClassifier> = match HttpClassifier::new(
        &services.classifier.endpoint,
        &services.classifier.api_key,
        services.classifier.timeout_secs,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::warn!("Document classification unavailable: {e}");
            Arc::new(Unconfigured("classification"))
        }
    };

    Collaborators {
        mailer,
        drafter,
        classifier,
    }
}

struct Unconfigured(&'static str);

impl Unconfigured {
    fn err(&self) -> CollabError {
        CollabError::Misconfigured(format!("{} service not configured", self.0))
    }
}

impl MailSender for Unconfigured {
    fn send(&self, _email: &OutboundEmail) -> Result<(), CollabError> {
        Err(self.err())
    }
}

impl Drafter for Unconfigured {
    fn draft(&self, _prompt: &DraftPrompt) -> Result<String, CollabError> {
        Err(self.err())
    }
}

impl DocumentClassifier for Unconfigured {
    fn classify(&self, _claim_number: &str, _file_name: &str) -> Result<Classification, CollabError> {
        Err(self.err())
    }
}
