//! Schema migration framework.
//!
//! Numbered SQL migrations are embedded at compile time via `include_str!`.
//! Each migration runs exactly once, tracked by the `schema_version` table.
//! A hot backup of the database is taken before any pending migration runs.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

/// Create the `schema_version` table if it doesn't exist.
fn ensure_schema_version_table(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))
}

/// Return the highest applied migration version, or 0 if none.
fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Back up the database before applying migrations.
///
/// Uses SQLite's online backup API to create a hot copy at
/// `<db_path>.pre-migration.bak`. Only called when there are pending
/// migrations.
fn backup_before_migration(conn: &Connection) -> Result<(), String> {
    let db_path: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("Failed to get database path: {}", e))?;

    if db_path.is_empty() || db_path == ":memory:" {
        // In-memory or temp database, skip backup
        return Ok(());
    }

    let backup_path = format!("{}.pre-migration.bak", db_path);
    let mut backup_conn = rusqlite::Connection::open(&backup_path)
        .map_err(|e| format!("Failed to open backup file: {}", e))?;

    let backup = rusqlite::backup::Backup::new(conn, &mut backup_conn)
        .map_err(|e| format!("Failed to initialize pre-migration backup: {}", e))?;

    backup
        .step(-1)
        .map_err(|e| format!("Pre-migration backup failed: {}", e))?;

    log::info!("Pre-migration backup created at {}", backup_path);
    Ok(())
}

/// Run all pending migrations.
///
/// Returns the number of migrations applied (0 if already up-to-date).
///
/// Forward-compat guard: if the database has a higher version than the highest
/// known migration, returns an error telling the operator to update the
/// engine binary.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    ensure_schema_version_table(conn)?;

    let current = current_version(conn)?;
    let max_known = MIGRATIONS.last().map(|m| m.version).unwrap_or(0);

    if current > max_known {
        return Err(format!(
            "Database schema version ({}) is newer than this build supports ({}). \
             Deploy a newer engine binary against this database.",
            current, max_known
        ));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        return Ok(0);
    }

    backup_before_migration(conn)?;

    for migration in &pending {
        conn.execute_batch(migration.sql)
            .map_err(|e| format!("Migration v{} failed: {}", migration.version, e))?;

        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(|e| format!("Failed to record migration v{}: {}", migration.version, e))?;

        log::info!("Applied migration v{}", migration.version);
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn mem_db() -> Connection {
        Connection::open_in_memory().expect("in-memory db")
    }

    #[test]
    fn test_fresh_db_applies_baseline() {
        let conn = mem_db();
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 1, "should apply exactly 1 migration (baseline)");

        let version = current_version(&conn).expect("version query");
        assert_eq!(version, 1);

        // Key tables exist and accept their full column sets
        conn.execute(
            "INSERT INTO claims (id, claim_number, policy_number, status, loss_type,
             adjuster_name, adjuster_email, policyholder_name, policyholder_email)
             VALUES ('c1', 'CLM-100', 'HO-3-12345', 'open', 'wind',
             'Pat Doe', 'pat@carrier.example', 'Lee Smith', 'lee@home.example')",
            [],
        )
        .expect("claims should have all columns");

        conn.execute(
            "INSERT INTO automation_policies (claim_id, autonomy_level, is_enabled,
             daily_action_limit, rd_follow_up_enabled, rd_follow_up_interval_days)
             VALUES ('c1', 'fully_autonomous', 1, 5, 1, 14)",
            [],
        )
        .expect("automation_policies should have both follow-up tracks");

        conn.execute(
            "INSERT INTO action_log (id, claim_id, action_type, natural_key)
             VALUES ('al-1', 'c1', 'escalation', 'deadline:d1')",
            [],
        )
        .expect("action_log should accept natural_key");

        conn.execute(
            "INSERT INTO carrier_deadlines (id, claim_id, deadline_type, trigger_date,
             offset_days, is_business_days, deadline_date)
             VALUES ('d1', 'c1', 'acknowledgment', '2026-01-05', 10, 1, '2026-01-19')",
            [],
        )
        .expect("carrier_deadlines should exist");
    }

    #[test]
    fn test_natural_key_unique_index() {
        let conn = mem_db();
        run_migrations(&conn).expect("migrations");

        conn.execute(
            "INSERT INTO claims (id, claim_number) VALUES ('c1', 'CLM-1')",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO action_log (id, claim_id, action_type, natural_key)
             VALUES ('al-1', 'c1', 'escalation', 'deadline:d1')",
            [],
        )
        .unwrap();

        // Same natural key is rejected; OR IGNORE swallows it silently
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO action_log (id, claim_id, action_type, natural_key)
                 VALUES ('al-2', 'c1', 'escalation', 'deadline:d1')",
                [],
            )
            .unwrap();
        assert_eq!(changed, 0, "duplicate natural key should be ignored");

        // NULL natural keys never collide
        for id in ["al-3", "al-4"] {
            conn.execute(
                "INSERT INTO action_log (id, claim_id, action_type) VALUES (?1, 'c1', 'email_sent')",
                [id],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_forward_compat_guard() {
        let conn = mem_db();

        ensure_schema_version_table(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (999)", [])
            .unwrap();

        let result = run_migrations(&conn);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(
            err.contains("newer than this build"),
            "error should mention version mismatch: {}",
            err
        );
    }

    #[test]
    fn test_idempotency() {
        let conn = mem_db();

        let first = run_migrations(&conn).expect("first run");
        assert_eq!(first, 1);

        let second = run_migrations(&conn).expect("second run");
        assert_eq!(second, 0, "second run should apply no migrations");

        let version = current_version(&conn).expect("version query");
        assert_eq!(version, 1);
    }

    #[test]
    fn test_pre_migration_backup_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("test_backup.db");

        let conn = Connection::open(&db_path).expect("open db");
        conn.execute_batch("PRAGMA journal_mode=WAL;").unwrap();

        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 1);

        let backup_path = dir.path().join("test_backup.db.pre-migration.bak");
        assert!(
            backup_path.exists(),
            "pre-migration backup should be created at {}",
            backup_path.display()
        );
    }
}
