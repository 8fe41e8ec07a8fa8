use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use super::DatabaseError;

/// Open a SQLite connection to the given path and run migrations.
///
/// Every statement on the connection is bounded by `busy_timeout_ms`;
/// a statement that cannot acquire the database within that window fails
/// instead of blocking the handler indefinitely.
pub fn open_database(path: &Path, busy_timeout_ms: u64) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure(&conn, busy_timeout_ms)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (development mode and tests).
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure(&conn, 5000)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout_ms: u64) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;",
    )?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    Ok(())
}

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/migrations/001_initial.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet).
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

/// Count tables in the database (for verification).
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // 21 entity tables + schema_version
        let count = count_tables(&conn).unwrap();
        assert!(count >= 21, "Expected at least 21 tables, got {count}");
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn database_opens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("safe.db");
        let conn = open_database(&path, 5000).unwrap();
        let count = count_tables(&conn).unwrap();
        assert!(count >= 21);

        // Re-open — migrations must be idempotent
        drop(conn);
        let conn2 = open_database(&path, 5000).unwrap();
        assert!(count_tables(&conn2).unwrap() >= 21);
    }

    #[test]
    fn role_check_constraint_enforced() {
        let conn = open_memory_database().unwrap();
        let result = conn.execute(
            "INSERT INTO users (id, email, password_hash, name, role)
             VALUES ('u1', 'x@y.z', 'hash', 'X', 'superuser')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn email_unique_constraint_enforced() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO users (id, email, password_hash, name, role)
             VALUES ('u1', 'dup@safe.test', 'hash', 'A', 'patient')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO users (id, email, password_hash, name, role)
             VALUES ('u2', 'dup@safe.test', 'hash', 'B', 'doctor')",
            [],
        );
        assert!(result.is_err());
    }
}
