//! ClaimPilot: claim automation and escalation engine for an insurance
//! claims office.
//!
//! Watches claims in SQLite, completes answered tasks, dispatches approved
//! drafts, raises escalations on stalls and deadlines, and runs follow-up
//! cadences. Ticks fire from an in-process cron scheduler or from the HTTP
//! trigger surface in [`server`].

use std::path::PathBuf;
use std::sync::Arc;

pub mod clients;
pub mod config;
pub mod db;
pub mod deadline;
pub mod engine;
pub mod error;
mod migrations;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod types;

use config::Config;
use scheduler::Scheduler;
use state::AppState;
use types::TickKind;

/// Boot the service: load config, verify the database, start the scheduler,
/// and serve HTTP until interrupted. Exits the process on unrecoverable
/// startup failures so supervisors see a non-zero status.
pub fn run() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration unusable: {e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &config.db_path {
        db::set_db_path_override(PathBuf::from(path));
    }

    // Open once at boot so migration failures are loud instead of surfacing
    // on the first tick.
    if let Err(e) = db::ClaimDb::open() {
        log::error!("Database unusable: {e}");
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        let state = Arc::new(AppState::new(config));

        announce_schedules(&state);

        let scheduler = Scheduler::new(state.clone());
        tokio::spawn(async move {
            scheduler.run().await;
        });

        let listener = match tokio::net::TcpListener::bind(&state.config.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("Failed to bind {}: {e}", state.config.bind_addr);
                std::process::exit(1);
            }
        };
        log::info!("Listening on http://{}", state.config.bind_addr);

        let app = server::router(state);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            log::error!("Server error: {e}");
        }
    });
}

fn announce_schedules(state: &AppState) {
    let schedules = [
        (TickKind::Engine, &state.config.schedules.engine),
        (TickKind::FollowUp, &state.config.schedules.follow_up),
    ];
    for (kind, entry) in schedules {
        if !entry.enabled {
            log::info!("{} schedule disabled; HTTP trigger only", kind.as_str());
            continue;
        }
        match scheduler::next_run_time(entry) {
            Ok(next) => log::info!("{} schedule: next run at {}", kind.as_str(), next),
            Err(e) => log::warn!("{} schedule unusable: {e}", kind.as_str()),
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutdown signal received"),
        Err(e) => {
            // Without a signal handler the server can only be killed hard;
            // keep serving rather than shutting down by accident.
            log::warn!("Failed to install shutdown handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}
