//! Numbered catalog schema scripts.
//!
//! 1. `shortcuts` with the enabled-name backstop index.
//! 2. `audit_log`, append-only through triggers.
//! 3. `registry_backups`, serialized pre-apply key snapshots.
//!
//! # Invariants
//! - Scripts are append-only; a shipped script is never edited.
//! - All pending scripts run in one transaction and `PRAGMA user_version`
//!   ends at the last one applied.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

const SCRIPTS: &[(u32, &str)] = &[
    (1, include_str!("0001_shortcuts.sql")),
    (2, include_str!("0002_audit_log.sql")),
    (3, include_str!("0003_registry_backups.sql")),
];

/// Highest schema version this build can read and write.
pub fn latest_version() -> u32 {
    SCRIPTS.last().map_or(0, |(version, _)| *version)
}

/// Current `PRAGMA user_version` of `conn`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Brings `conn` up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file is ahead of this build.
/// - `Migration` naming the script that failed; the whole run is rolled back.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = schema_version(conn)?;
    let to = latest_version();

    if from > to {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: to,
        });
    }
    if from == to {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for &(version, sql) in SCRIPTS.iter().filter(|(version, _)| *version > from) {
        tx.execute_batch(sql)
            .and_then(|()| tx.pragma_update(None, "user_version", version))
            .map_err(|source| DbError::Migration { version, source })?;
    }
    tx.commit()?;

    info!("event=catalog_migrate module=db status=ok from_version={from} to_version={to}");
    Ok(())
}
