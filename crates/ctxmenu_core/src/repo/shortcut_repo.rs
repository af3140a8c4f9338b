//! Shortcut store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide durable CRUD over the `shortcuts` table.
//! - Enforce name uniqueness among enabled entries of one target type.
//!
//! # Invariants
//! - Write paths call `ShortcutDraft::validate()` and the security validator
//!   before SQL mutations.
//! - `applied_state` is only changed through `record_applied_state` and
//!   `record_applied_batch`; the batch form is all-or-nothing.
//! - Read paths reject invalid persisted state instead of masking it.
//! - `list` returns creation order.

use super::backup_repo::{self, RegistryBackup};
use crate::db::DbError;
use crate::model::audit::now_epoch_ms;
use crate::model::shortcut::{
    AppliedState, MenuStyle, ShortcutDraft, ShortcutEntry, ShortcutId, ShortcutPatch,
    ShortcutValidationError, TargetType,
};
use crate::registry::KeySnapshot;
use crate::security::SecurityValidator;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const SHORTCUT_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    command,
    icon_path,
    target_type,
    menu_style,
    is_enabled,
    applied_state,
    apply_count,
    created_at,
    updated_at
FROM shortcuts";

pub type StoreResult<T> = Result<T, StoreError>;

/// Store error for shortcut and audit persistence.
#[derive(Debug)]
pub enum StoreError {
    /// Name, command or icon rejected; carries the rejection reason.
    Validation(String),
    /// Another enabled entry of the same target already uses the name.
    Conflict(String),
    NotFound(ShortcutId),
    Db(DbError),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(reason) => write!(f, "validation failed: {reason}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::NotFound(id) => write!(f, "shortcut not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(_) | Self::Conflict(_) | Self::NotFound(_) | Self::InvalidData(_) => {
                None
            }
        }
    }
}

impl From<ShortcutValidationError> for StoreError {
    fn from(value: ShortcutValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Listing filter. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShortcutFilter {
    pub target_type: Option<TargetType>,
    pub enabled: Option<bool>,
}

impl ShortcutFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn enabled_only() -> Self {
        Self {
            enabled: Some(true),
            ..Self::default()
        }
    }
}

/// Persistent, ordered collection of shortcut records.
pub trait ShortcutStore {
    /// Inserts a new entry in `Pending` state and returns it.
    fn create(&self, draft: &ShortcutDraft) -> StoreResult<ShortcutEntry>;
    /// Applies a partial update and returns the stored result.
    fn update(&self, id: ShortcutId, patch: &ShortcutPatch) -> StoreResult<ShortcutEntry>;
    fn delete(&self, id: ShortcutId) -> StoreResult<()>;
    fn get(&self, id: ShortcutId) -> StoreResult<Option<ShortcutEntry>>;
    fn list(&self, filter: &ShortcutFilter) -> StoreResult<Vec<ShortcutEntry>>;
    /// Records a registry sync outcome. `Applied` also bumps `apply_count`.
    fn record_applied_state(&self, id: ShortcutId, state: AppliedState) -> StoreResult<()>;
    /// Records one outcome for every id in a single transaction.
    fn record_applied_batch(&self, ids: &[ShortcutId], state: AppliedState) -> StoreResult<()>;
    /// Persists the pre-apply copy of an entry's menu key.
    fn save_backup(&self, entry_id: ShortcutId, snapshot: &KeySnapshot) -> StoreResult<i64>;
    fn latest_backup(&self, entry_id: ShortcutId) -> StoreResult<Option<RegistryBackup>>;
}

/// SQLite-backed shortcut store.
pub struct SqliteShortcutStore<'conn> {
    conn: &'conn Connection,
    validator: SecurityValidator,
}

impl<'conn> SqliteShortcutStore<'conn> {
    pub fn new(conn: &'conn Connection, validator: SecurityValidator) -> Self {
        Self { conn, validator }
    }

    pub fn validator(&self) -> &SecurityValidator {
        &self.validator
    }

    fn check_draft(&self, draft: &ShortcutDraft) -> StoreResult<()> {
        draft.validate()?;
        self.validator
            .validate(&draft.command)
            .into_result()
            .map_err(StoreError::Validation)?;
        if let Some(icon_path) = draft.icon_path.as_deref() {
            self.validator
                .validate_icon_path(icon_path)
                .into_result()
                .map_err(|reason| StoreError::Validation(format!("icon: {reason}")))?;
        }
        Ok(())
    }

    fn ensure_unique_name(
        &self,
        draft: &ShortcutDraft,
        exclude: Option<ShortcutId>,
    ) -> StoreResult<()> {
        if !draft.enabled {
            return Ok(());
        }

        let mut stmt = self.conn.prepare(
            "SELECT uuid, name FROM shortcuts
             WHERE target_type = ?1
               AND is_enabled = 1;",
        )?;
        let mut rows = stmt.query([draft.target_type.as_str()])?;
        let wanted = draft.name.to_lowercase();
        let excluded = exclude.map(|id| id.to_string());

        while let Some(row) = rows.next()? {
            let uuid: String = row.get(0)?;
            let name: String = row.get(1)?;
            if excluded.as_deref() == Some(uuid.as_str()) {
                continue;
            }
            if name.to_lowercase() == wanted {
                return Err(name_conflict(draft));
            }
        }
        Ok(())
    }
}

impl ShortcutStore for SqliteShortcutStore<'_> {
    fn create(&self, draft: &ShortcutDraft) -> StoreResult<ShortcutEntry> {
        self.check_draft(draft)?;
        self.ensure_unique_name(draft, None)?;

        let id = Uuid::new_v4();
        let now = now_epoch_ms();
        self.conn
            .execute(
                "INSERT INTO shortcuts (
                    uuid,
                    name,
                    command,
                    icon_path,
                    target_type,
                    menu_style,
                    is_enabled,
                    applied_state,
                    apply_count,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', 0, ?8, ?8);",
                params![
                    id.to_string(),
                    draft.name.as_str(),
                    draft.command.as_str(),
                    draft.icon_path.as_deref(),
                    draft.target_type.as_str(),
                    draft.menu_style.as_str(),
                    bool_to_int(draft.enabled),
                    now,
                ],
            )
            .map_err(|err| map_unique_violation(err, draft))?;

        debug!(
            "event=shortcut_create module=store status=ok id={id} target={}",
            draft.target_type
        );
        self.get(id)?.ok_or(StoreError::NotFound(id))
    }

    fn update(&self, id: ShortcutId, patch: &ShortcutPatch) -> StoreResult<ShortcutEntry> {
        let current = self.get(id)?.ok_or(StoreError::NotFound(id))?;
        if patch.is_empty() {
            return Ok(current);
        }

        let draft = current.patched(patch);
        self.check_draft(&draft)?;
        self.ensure_unique_name(&draft, Some(id))?;

        let changed = self
            .conn
            .execute(
                "UPDATE shortcuts
                 SET
                    name = ?1,
                    command = ?2,
                    icon_path = ?3,
                    target_type = ?4,
                    menu_style = ?5,
                    is_enabled = ?6,
                    updated_at = ?7
                 WHERE uuid = ?8;",
                params![
                    draft.name.as_str(),
                    draft.command.as_str(),
                    draft.icon_path.as_deref(),
                    draft.target_type.as_str(),
                    draft.menu_style.as_str(),
                    bool_to_int(draft.enabled),
                    now_epoch_ms(),
                    id.to_string(),
                ],
            )
            .map_err(|err| map_unique_violation(err, &draft))?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }

        self.get(id)?.ok_or(StoreError::NotFound(id))
    }

    fn delete(&self, id: ShortcutId) -> StoreResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM shortcuts WHERE uuid = ?1;", [id.to_string()])?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }

        Ok(())
    }

    fn get(&self, id: ShortcutId) -> StoreResult<Option<ShortcutEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SHORTCUT_SELECT_SQL} WHERE uuid = ?1;"))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_shortcut_row(row)?));
        }

        Ok(None)
    }

    fn list(&self, filter: &ShortcutFilter) -> StoreResult<Vec<ShortcutEntry>> {
        let mut sql = format!("{SHORTCUT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(target_type) = filter.target_type {
            sql.push_str(" AND target_type = ?");
            bind_values.push(Value::Text(target_type.as_str().to_string()));
        }

        if let Some(enabled) = filter.enabled {
            sql.push_str(" AND is_enabled = ?");
            bind_values.push(Value::Integer(bool_to_int(enabled)));
        }

        sql.push_str(" ORDER BY seq ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();

        while let Some(row) = rows.next()? {
            entries.push(parse_shortcut_row(row)?);
        }

        Ok(entries)
    }

    fn record_applied_state(&self, id: ShortcutId, state: AppliedState) -> StoreResult<()> {
        write_applied_state(self.conn, id, state)
    }

    fn record_applied_batch(&self, ids: &[ShortcutId], state: AppliedState) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for &id in ids {
            write_applied_state(&tx, id, state)?;
        }
        tx.commit()?;
        debug!(
            "event=state_record module=repo status=ok entries={} state={state}",
            ids.len()
        );
        Ok(())
    }

    fn save_backup(&self, entry_id: ShortcutId, snapshot: &KeySnapshot) -> StoreResult<i64> {
        backup_repo::insert_backup(self.conn, entry_id, snapshot)
    }

    fn latest_backup(&self, entry_id: ShortcutId) -> StoreResult<Option<RegistryBackup>> {
        backup_repo::latest_backup(self.conn, entry_id)
    }
}

fn write_applied_state(conn: &Connection, id: ShortcutId, state: AppliedState) -> StoreResult<()> {
    let increment = i64::from(state == AppliedState::Applied);
    let changed = conn.execute(
        "UPDATE shortcuts
         SET
            applied_state = ?1,
            apply_count = apply_count + ?2
         WHERE uuid = ?3;",
        params![state.as_str(), increment, id.to_string()],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound(id));
    }

    Ok(())
}

fn name_conflict(draft: &ShortcutDraft) -> StoreError {
    StoreError::Conflict(format!(
        "an enabled {} shortcut named `{}` already exists",
        draft.target_type, draft.name
    ))
}

fn map_unique_violation(err: rusqlite::Error, draft: &ShortcutDraft) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            name_conflict(draft)
        }
        _ => StoreError::from(err),
    }
}

fn parse_shortcut_row(row: &Row<'_>) -> StoreResult<ShortcutEntry> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid uuid value `{uuid_text}` in shortcuts.uuid"))
    })?;

    let target_text: String = row.get("target_type")?;
    let target_type = TargetType::parse(&target_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid target type `{target_text}` in shortcuts.target_type"
        ))
    })?;

    let style_text: String = row.get("menu_style")?;
    let menu_style = MenuStyle::parse(&style_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid menu style `{style_text}` in shortcuts.menu_style"
        ))
    })?;

    let state_text: String = row.get("applied_state")?;
    let applied_state = AppliedState::parse(&state_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid applied state `{state_text}` in shortcuts.applied_state"
        ))
    })?;

    let enabled = match row.get::<_, i64>("is_enabled")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid is_enabled value `{other}` in shortcuts.is_enabled"
            )));
        }
    };

    let apply_count_raw: i64 = row.get("apply_count")?;
    let apply_count = u32::try_from(apply_count_raw).map_err(|_| {
        StoreError::InvalidData(format!(
            "invalid apply_count value `{apply_count_raw}` in shortcuts.apply_count"
        ))
    })?;

    Ok(ShortcutEntry {
        id,
        name: row.get("name")?,
        command: row.get("command")?,
        icon_path: row.get("icon_path")?,
        target_type,
        menu_style,
        enabled,
        created_at_ms: row.get("created_at")?,
        modified_at_ms: row.get("updated_at")?,
        applied_state,
        apply_count,
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
