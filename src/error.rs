//! Error types for engine ticks.
//!
//! Errors are classified by recoverability: a retryable error is one a later
//! tick can clear on its own (the service hiccuped, the tick ran out of
//! time), everything else needs data or configuration fixed first.

use thiserror::Error;

use crate::clients::CollabError;
use crate::db::DbError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("{service}: {source}")]
    Collaborator {
        service: &'static str,
        source: CollabError,
    },

    #[error("Claim {0} not found")]
    ClaimMissing(String),

    #[error("No usable recipient email on claim {0}")]
    NoRecipient(String),

    #[error("Tick budget of {0}s exhausted, remaining claims deferred")]
    TickDeadline(u64),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    pub fn collab(service: &'static str, source: CollabError) -> Self {
        EngineError::Collaborator { service, source }
    }

    /// Returns true if a later tick is likely to succeed without anyone
    /// touching the claim.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Collaborator { source, .. } => source.is_retryable(),
            EngineError::TickDeadline(_) => true,
            EngineError::Db(_)
            | EngineError::ClaimMissing(_)
            | EngineError::NoRecipient(_)
            | EngineError::Configuration(_) => false,
        }
    }
}
