//! Persisted pre-apply registry snapshots.
//!
//! Each apply stores the menu key as it was before the first write, so an
//! apply interrupted by a crash can be undone on the next start.

use super::shortcut_repo::{StoreError, StoreResult};
use crate::model::audit::now_epoch_ms;
use crate::model::shortcut::ShortcutId;
use crate::registry::KeySnapshot;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// One stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryBackup {
    pub id: i64,
    pub entry_id: ShortcutId,
    pub snapshot: KeySnapshot,
    pub created_at_ms: i64,
}

pub(crate) fn insert_backup(
    conn: &Connection,
    entry_id: ShortcutId,
    snapshot: &KeySnapshot,
) -> StoreResult<i64> {
    let snapshot_json = serde_json::to_string(snapshot)
        .map_err(|err| StoreError::InvalidData(format!("unserializable snapshot: {err}")))?;
    conn.execute(
        "INSERT INTO registry_backups (entry_uuid, key_path, snapshot_json, created_at)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            entry_id.to_string(),
            snapshot.path.to_string(),
            snapshot_json,
            now_epoch_ms()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn latest_backup(
    conn: &Connection,
    entry_id: ShortcutId,
) -> StoreResult<Option<RegistryBackup>> {
    let row = conn
        .query_row(
            "SELECT id, entry_uuid, snapshot_json, created_at
             FROM registry_backups
             WHERE entry_uuid = ?1
             ORDER BY id DESC
             LIMIT 1;",
            [entry_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((id, uuid_text, snapshot_json, created_at_ms)) = row else {
        return Ok(None);
    };
    let entry_id = Uuid::parse_str(&uuid_text).map_err(|_| {
        StoreError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in registry_backups.entry_uuid"
        ))
    })?;
    let snapshot = serde_json::from_str(&snapshot_json).map_err(|err| {
        StoreError::InvalidData(format!("invalid snapshot in registry_backups.id={id}: {err}"))
    })?;

    Ok(Some(RegistryBackup {
        id,
        entry_id,
        snapshot,
        created_at_ms,
    }))
}
