//! SQLite-based state store for claims, automation policies, and the action log.
//!
//! The database lives at `~/.claimpilot/claimpilot.db` and is the engine's
//! single source of truth: policy state, follow-up cadence counters, quota
//! accounting, and the audit trail all live here. The natural-key unique
//! index on `action_log` is what makes engine ticks safe to re-run.

use std::path::PathBuf;
use std::sync::OnceLock;

use rusqlite::Connection;

pub mod types;
pub use types::*;

/// Process-wide database path override, set once at startup when the config
/// names an explicit path. Background tasks (scheduler ticks, HTTP-triggered
/// ticks) all call `ClaimDb::open()` independently; the static means they
/// pick up the right path without plumbing config through every task.
static DB_PATH_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

/// Steer all subsequent `ClaimDb::open()` calls to an explicit path.
/// Later calls are no-ops once a path is set.
pub fn set_db_path_override(path: PathBuf) {
    let _ = DB_PATH_OVERRIDE.set(path);
}

pub struct ClaimDb {
    conn: Connection,
}

impl ClaimDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at its resolved path and apply migrations.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub(crate) fn open_at(path: PathBuf) -> Result<Self, DbError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL mode for concurrent reads while a tick holds a write transaction
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        // Enable FK constraint enforcement after migrations so future
        // table-recreation migrations can run with it off.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Resolve the database path: the startup override when one is set,
    /// otherwise `~/.claimpilot/claimpilot.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        if let Some(path) = DB_PATH_OVERRIDE.get() {
            return Ok(path.clone());
        }
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".claimpilot").join("claimpilot.db"))
    }
}

pub mod action_log;
pub mod claims;
pub mod deadlines;
pub mod documents;
pub mod pending;
pub mod policies;
pub mod runs;
pub mod tasks;

// =============================================================================
// Shared test utilities
// =============================================================================


// =============================================================================
// Tests
// =============================================================================
