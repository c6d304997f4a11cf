//! Cache schema migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::{CacheError, CacheResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> CacheResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version > CURRENT_VERSION {
        return Err(CacheError::Migration(format!(
            "cache schema version {current_version} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current_version < 1 {
        migrate_v1_cache_table(conn)?;
    }

    debug!(
        from_version = current_version,
        to_version = CURRENT_VERSION,
        "Cache migrations complete"
    );
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> CacheResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: the `cache` table, one row per fingerprint.
fn migrate_v1_cache_table(conn: &Connection) -> CacheResult<()> {
    info!("Applying migration v1: cache table");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            attempts INTEGER NOT NULL DEFAULT 0,
            data TEXT NOT NULL UNIQUE CHECK (length(data) <= 4096)
        );

        CREATE INDEX IF NOT EXISTS idx_cache_attempts ON cache(attempts);
        ",
    )?;

    record_migration(conn, 1, "cache_table")
}
