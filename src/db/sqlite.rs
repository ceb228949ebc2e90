//! Connection setup and schema migrations.
//!
//! Every open runs the same sequence: create the base tables if absent,
//! then apply pending migrations in ascending version order. The migration
//! list is append-only — a shipped step's body never changes; new schema
//! work is a new entry.

use std::path::Path;

use rusqlite::Connection;
use tracing;

use super::DatabaseError;

/// Open a SQLite database at the given path and bring its schema current.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for tests and headless consumers).
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Ensure base tables exist, then run pending migrations.
pub fn init_schema(conn: &Connection) -> Result<(), DatabaseError> {
    ensure_base_tables(conn)?;
    run_migrations(conn)?;
    Ok(())
}

/// Create the three base tables. Idempotent; also the recreation step used
/// by [`Store::reset_all`](super::Store::reset_all).
///
/// JSON columns: `times` and `keys` hold string arrays, `config` holds the
/// schedule's open config object, `records.data` holds key -> bool.
pub fn ensure_base_tables(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
         );

         CREATE TABLE IF NOT EXISTS medications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            dosage TEXT,
            frequency TEXT,
            times TEXT,
            color TEXT,
            icon TEXT,
            keys TEXT,
            type TEXT DEFAULT 'daily',
            config TEXT
         );

         CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL UNIQUE,
            data TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
         );",
    )?;
    Ok(())
}

type MigrationFn = fn(&Connection) -> Result<(), rusqlite::Error>;

/// Append-only migration chain. Bodies are Rust functions rather than SQL
/// blobs because a step must be able to tolerate pre-existing columns.
const MIGRATIONS: &[(i64, MigrationFn)] = &[(1, migrate_v1_type_config)];

/// v1: databases from before schema versioning lack the `type` and
/// `config` columns on `medications`.
fn migrate_v1_type_config(conn: &Connection) -> Result<(), rusqlite::Error> {
    add_column_if_missing(conn, "medications", "type TEXT DEFAULT 'daily'")?;
    add_column_if_missing(conn, "medications", "config TEXT")?;
    Ok(())
}

/// Run all migrations newer than the recorded version, advancing the
/// version row after every step.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    apply_migrations(conn, MIGRATIONS)
}

/// A failed step is logged and skipped rather than aborting the open —
/// data availability outranks strict schema enforcement here — and the
/// version still advances so a broken step is never retried forever.
fn apply_migrations(
    conn: &Connection,
    migrations: &[(i64, MigrationFn)],
) -> Result<(), DatabaseError> {
    let current = current_version(conn);

    for (version, step) in migrations {
        if *version > current {
            tracing::info!("Running migration v{version}");
            if let Err(e) = step(conn) {
                let err = DatabaseError::MigrationFailed {
                    version: *version,
                    reason: e.to_string(),
                };
                tracing::warn!("{err}; skipping step and advancing version");
            }
            set_version(conn, *version)?;
        }
    }

    Ok(())
}

/// The recorded schema version (0 if unset or the table is absent).
pub fn current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

fn set_version(conn: &Connection, version: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// `ALTER TABLE ... ADD COLUMN`, treating an already-present column as a
/// no-op instead of an error.
fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column_def: &str,
) -> Result<(), rusqlite::Error> {
    match conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column_def}"), []) {
        Ok(_) => Ok(()),
        Err(e) if e.to_string().contains("duplicate column name") => Ok(()),
        Err(e) => Err(e),
    }
}

/// Count user tables (for verification).
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}
