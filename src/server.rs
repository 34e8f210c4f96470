//! HTTP trigger surface.
//!
//! Three routes: two POST endpoints for external cron services to fire the
//! ticks, and an unauthenticated liveness probe. Double fires are harmless
//! (the engine's natural keys absorb them), but an overlapping run of the
//! same kind is rejected with 409 rather than queued.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::db::{ClaimDb, DbError};
use crate::state::{AppState, TickError};
use crate::types::TickKind;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/cron/engine", post(trigger_engine))
        .route("/cron/follow-ups", post(trigger_follow_ups))
        .with_state(state)
}

async fn trigger_engine(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    trigger_tick(state, headers, TickKind::Engine).await
}

async fn trigger_follow_ups(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    trigger_tick(state, headers, TickKind::FollowUp).await
}

async fn trigger_tick(state: Arc<AppState>, headers: HeaderMap, kind: TickKind) -> Response {
    if !authorized(state.config.cron_secret.as_deref(), &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid or missing x-cron-secret" })),
        )
            .into_response();
    }
    match state.execute_tick(kind).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(TickError::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "tick already running" })),
        )
            .into_response(),
        Err(TickError::Failed(msg)) => {
            log::error!("{} tick failed to start: {}", kind.as_str(), msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": msg })),
            )
                .into_response()
        }
    }
}

/// No secret configured means the trigger routes are open; local deployments
/// sit behind the loopback bind.
fn authorized(secret: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = secret else {
        return true;
    };
    headers
        .get("x-cron-secret")
        .and_then(|v| v.to_str().ok())
        .map(|provided| secret_matches(provided, expected))
        .unwrap_or(false)
}

/// Digest comparison so the check leaks neither the secret's length nor a
/// matching prefix through timing.
fn secret_matches(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}

async fn healthz() -> Response {
    let probe = tokio::task::spawn_blocking(|| -> Result<(), DbError> {
        let db = ClaimDb::open()?;
        db.conn_ref().query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    })
    .await;

    match probe {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Ok(Err(e)) => degraded(e.to_string()),
        Err(e) => degraded(format!("health probe panicked: {e}")),
    }
}

fn degraded(reason: String) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "degraded", "reason": reason })),
    )
        .into_response()
}
