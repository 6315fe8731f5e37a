//! SQLite schema DDL and migration framework for the run store.

use rusqlite::Connection;

use crate::errors::SchemeResult;

/// Current schema version. Migrations run from whatever the DB currently
/// reports up to this value.
pub const SCHEMA_VERSION: i32 = 2;

/// Executed with `CREATE … IF NOT EXISTS` so they are safe to replay on an
/// already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        label TEXT NOT NULL,
        content_hash TEXT NOT NULL UNIQUE,
        record_count INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS run_records (
        run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        identity_key TEXT NOT NULL,
        item_id TEXT NOT NULL,
        payload TEXT NOT NULL,
        PRIMARY KEY (run_id, position)
    );",
    "CREATE INDEX IF NOT EXISTS idx_run_records_identity ON run_records(identity_key);",
];

/// Apply the DDL and run pending migrations.
pub fn init_schema(conn: &Connection) -> SchemeResult<()> {
    for stmt in SCHEMA_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    migrate_schema(conn)
}

/// Run all pending migrations from the stored version up to
/// [`SCHEMA_VERSION`]. Each step is wrapped in a SAVEPOINT so a failure
/// rolls back only that step.
pub fn migrate_schema(conn: &Connection) -> SchemeResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < SCHEMA_VERSION {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT schemes_migrate_step;")?;

        let step_result = (|| -> SchemeResult<()> {
            match next_version {
                1 => migrate_to_v1(conn)?,
                2 => migrate_to_v2(conn)?,
                _ => {}
            }
            set_schema_version(conn, next_version)?;
            conn.execute_batch("RELEASE SAVEPOINT schemes_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => current_version = next_version,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT schemes_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT schemes_migrate_step;");
                tracing::warn!(from = current_version, to = next_version, error = %e, "schema migration failed");
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Returns 0 when the key is absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SchemeResult<()> {
    conn.execute(
        "INSERT INTO store_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

/// v0 -> v1: baseline.
fn migrate_to_v1(_conn: &Connection) -> SchemeResult<()> {
    Ok(())
}

/// v1 -> v2: scheme lookup table so reverse queries avoid decoding payloads.
fn migrate_to_v2(conn: &Connection) -> SchemeResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS run_schemes (
            run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            scheme TEXT NOT NULL,
            item_id TEXT NOT NULL,
            PRIMARY KEY (run_id, scheme, item_id)
        );
        CREATE INDEX IF NOT EXISTS idx_run_schemes_scheme ON run_schemes(scheme);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn test_init_is_replayable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'run_schemes';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_fresh_database_reports_version_zero() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn), 0);
    }
}
