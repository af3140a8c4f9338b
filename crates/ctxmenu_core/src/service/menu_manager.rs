//! Shortcut lifecycle orchestration.
//!
//! # Responsibility
//! - Drive validate → store → registry for every shortcut mutation.
//! - Model registry writes as stage/apply/compensate, since the registry
//!   has no transactions.
//! - Append one audit record per mutating operation outcome.
//!
//! # Invariants
//! - `applied_state` only moves through this type.
//! - A failed apply never leaves keys it created behind unless the
//!   compensation itself fails; the leftover keys are then reported.
//! - A failed batch restores every entry applied earlier in the same batch
//!   to its pre-batch registry snapshot; later entries are never attempted.
//! - Keys owned by another entry, or by nobody, are never overwritten or
//!   removed.
//! - Audit failures are logged and never replace the operation result.
//! - Mutations hold the `MutationGate`; a held gate fails fast with `Busy`.
//! - The pre-apply menu key is persisted before the first registry write.

use crate::capability::MenuCapabilities;
use crate::model::audit::{AuditOperation, AuditRecord};
use crate::model::shortcut::{
    AppliedState, ShortcutDraft, ShortcutEntry, ShortcutId, ShortcutPatch, TargetType,
};
use crate::registry::layout::{
    self, command_key, entry_menu_key, parse_owner, parse_style, DEFAULT_VALUE_NAME,
    OWNER_VALUE_NAME, STYLE_VALUE_NAME,
};
use crate::registry::{AdapterError, KeySnapshot, RegistryAdapter, RegistryPath};
use crate::repo::audit_repo::AuditSink;
use crate::repo::shortcut_repo::{ShortcutFilter, ShortcutStore, StoreError};
use crate::security::SecurityValidator;
use crate::service::gate::{GateGuard, MutationGate};
use crate::service::interchange::{FormatError, ImportExport};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Result of undoing a partially applied entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Registry is back to its pre-apply state.
    Clean,
    /// These keys could not be restored and need manual attention.
    Partial { leftover: Vec<RegistryPath> },
}

impl RollbackOutcome {
    fn from_leftover(leftover: Vec<RegistryPath>) -> Self {
        if leftover.is_empty() {
            Self::Clean
        } else {
            Self::Partial { leftover }
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

impl Display for RollbackOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "rolled back cleanly"),
            Self::Partial { leftover } => {
                write!(f, "rollback incomplete, {} key(s) left:", leftover.len())?;
                for path in leftover {
                    write!(f, " `{path}`")?;
                }
                Ok(())
            }
        }
    }
}

/// Why a batch stopped and what was undone.
#[derive(Debug)]
pub struct BatchFailure {
    pub failed_id: ShortcutId,
    pub cause: Box<ManagerError>,
    /// Entries restored to their pre-batch state, most recent first.
    pub rolled_back: Vec<ShortcutId>,
    pub rollback: RollbackOutcome,
}

/// Service error for shortcut lifecycle operations.
#[derive(Debug)]
pub enum ManagerError {
    /// Rejected input; carries the rejection reason.
    Validation(String),
    /// Name collision in the store or a registry key owned by someone else.
    Conflict(String),
    NotFound(ShortcutId),
    /// Disabled entries are never applied.
    Disabled(ShortcutId),
    /// Registry I/O failed while applying or removing one entry.
    Adapter {
        entry_id: ShortcutId,
        source: AdapterError,
        rollback: RollbackOutcome,
    },
    Batch(BatchFailure),
    /// Another mutation holds the gate.
    Busy,
    /// Background worker thread could not be started.
    Spawn(std::io::Error),
    Format(FormatError),
    Store(StoreError),
}

impl Display for ManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(reason) => write!(f, "validation failed: {reason}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::NotFound(id) => write!(f, "shortcut not found: {id}"),
            Self::Disabled(id) => write!(f, "shortcut is disabled: {id}"),
            Self::Adapter {
                entry_id,
                source,
                rollback,
            } => write!(f, "registry update failed for {entry_id}: {source}; {rollback}"),
            Self::Batch(failure) => write!(
                f,
                "batch apply stopped at {}: {}; {} entr(ies) restored, {}",
                failure.failed_id,
                failure.cause,
                failure.rolled_back.len(),
                failure.rollback
            ),
            Self::Busy => write!(f, "another catalog or registry mutation is running"),
            Self::Spawn(err) => write!(f, "failed to start batch worker: {err}"),
            Self::Format(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Adapter { source, .. } => Some(source),
            Self::Batch(failure) => Some(failure.cause.as_ref()),
            Self::Spawn(err) => Some(err),
            Self::Format(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ManagerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(reason) => Self::Validation(reason),
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

impl From<FormatError> for ManagerError {
    fn from(value: FormatError) -> Self {
        Self::Format(value)
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Outcome of `create_and_apply`: the entry always exists afterwards.
#[derive(Debug)]
pub struct ApplyReport {
    /// Stored entry after the apply attempt (`Applied` or `Failed`).
    pub entry: ShortcutEntry,
    pub apply_error: Option<ManagerError>,
}

impl ApplyReport {
    pub fn is_applied(&self) -> bool {
        self.apply_error.is_none()
    }
}

/// Successful batch summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: Vec<ShortcutId>,
    /// Disabled entries passed over.
    pub skipped: Vec<ShortcutId>,
}

/// What the registry holds at an entry's menu key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryPresence {
    Absent,
    /// Owned by the entry and matching its command.
    Owned,
    /// Owned by the entry but the command or style value differs.
    Stale,
    /// Present without this entry's ownership marker.
    Foreign,
}

/// Expected vs. actual registry state for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftReport {
    pub entry_id: ShortcutId,
    pub name: String,
    pub target_type: TargetType,
    pub menu_key: RegistryPath,
    pub applied_state: AppliedState,
    /// Enabled and recorded as applied.
    pub expected_present: bool,
    pub actual: RegistryPresence,
}

impl DriftReport {
    pub fn is_drifted(&self) -> bool {
        if self.expected_present {
            self.actual != RegistryPresence::Owned
        } else {
            matches!(
                self.actual,
                RegistryPresence::Owned | RegistryPresence::Stale
            )
        }
    }
}

/// Lifecycle facade over store, audit sink, registry and capabilities.
pub struct MenuManager<S, A, R, C>
where
    S: ShortcutStore,
    A: AuditSink,
    R: RegistryAdapter,
    C: MenuCapabilities,
{
    store: S,
    audit: A,
    registry: R,
    capabilities: C,
    validator: SecurityValidator,
    max_import_count: usize,
    gate: MutationGate,
}

impl<S, A, R, C> MenuManager<S, A, R, C>
where
    S: ShortcutStore,
    A: AuditSink,
    R: RegistryAdapter,
    C: MenuCapabilities,
{
    pub fn new(
        store: S,
        audit: A,
        registry: R,
        capabilities: C,
        validator: SecurityValidator,
    ) -> Self {
        Self {
            store,
            audit,
            registry,
            capabilities,
            validator,
            max_import_count: crate::config::DEFAULT_MAX_IMPORT_COUNT,
            gate: MutationGate::new(),
        }
    }

    /// Shares a gate with other managers or a `BatchWorker`.
    pub fn with_gate(mut self, gate: MutationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &MutationGate {
        &self.gate
    }

    /// Overrides the entry limit for interchange documents.
    pub fn with_max_import_count(mut self, max_import_count: usize) -> Self {
        self.max_import_count = max_import_count;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Import/export facade sharing this manager's store and audit sink.
    pub fn interchange(&self) -> ImportExport<'_, S, A> {
        ImportExport::new(&self.store, &self.audit)
            .with_max_entries(self.max_import_count)
            .with_gate(self.gate.clone())
    }

    pub fn get(&self, id: ShortcutId) -> ManagerResult<ShortcutEntry> {
        self.store.get(id)?.ok_or(ManagerError::NotFound(id))
    }

    pub fn list(&self, filter: &ShortcutFilter) -> ManagerResult<Vec<ShortcutEntry>> {
        Ok(self.store.list(filter)?)
    }

    /// Stores a new entry in `Pending` state without touching the registry.
    pub fn create(&mut self, draft: &ShortcutDraft) -> ManagerResult<ShortcutEntry> {
        let _guard = self.enter(AuditOperation::Create, None)?;
        self.create_inner(draft)
    }

    /// Creates then applies. Apply failures leave the entry stored as `Failed`.
    pub fn create_and_apply(&mut self, draft: &ShortcutDraft) -> ManagerResult<ApplyReport> {
        let _guard = self.enter(AuditOperation::Create, None)?;
        let created = self.create_inner(draft)?;
        let apply_error = self.apply_inner(created.id).err();
        let entry = self.get(created.id)?;
        Ok(ApplyReport { entry, apply_error })
    }

    /// Re-validates and stores a patch, then refreshes registry keys of an
    /// applied entry.
    pub fn update(&mut self, id: ShortcutId, patch: &ShortcutPatch) -> ManagerResult<ShortcutEntry> {
        let _guard = self.enter(AuditOperation::Update, Some(id))?;
        self.update_inner(id, patch)
    }

    /// Flips `enabled` through the regular update path.
    pub fn toggle_enabled(&mut self, id: ShortcutId) -> ManagerResult<ShortcutEntry> {
        let _guard = self.enter(AuditOperation::Update, Some(id))?;
        let current = self.load(AuditOperation::Update, id)?;
        let patch = ShortcutPatch {
            enabled: Some(!current.enabled),
            ..ShortcutPatch::default()
        };
        self.update_inner(id, &patch)
    }

    /// Removes registry keys, then the record.
    ///
    /// On removal failure the record is kept as `Failed`.
    pub fn delete(&mut self, id: ShortcutId) -> ManagerResult<()> {
        let _guard = self.enter(AuditOperation::Delete, Some(id))?;
        self.delete_inner(id)
    }

    /// Writes one entry to the registry.
    pub fn apply(&mut self, id: ShortcutId) -> ManagerResult<ShortcutEntry> {
        let _guard = self.enter(AuditOperation::Apply, Some(id))?;
        self.apply_inner(id)
    }

    /// Applies entries in order as one unit.
    ///
    /// Disabled entries are skipped. On the first failure every entry
    /// applied by this call is restored to its pre-batch snapshot and the
    /// rest are not attempted. Store state is written in one transaction
    /// once every registry write succeeded; a failed commit restores the
    /// registry as well.
    pub fn apply_batch(&mut self, ids: &[ShortcutId]) -> ManagerResult<BatchReport> {
        let _guard = self.enter(AuditOperation::Apply, None)?;
        self.apply_batch_inner(ids)
    }

    /// Deletes the entry's registry subtree. Absent keys count as success.
    pub fn remove(&mut self, id: ShortcutId) -> ManagerResult<ShortcutEntry> {
        let _guard = self.enter(AuditOperation::Rollback, Some(id))?;
        self.remove_inner(id)
    }

    /// Fails with `Conflict` when the entry's menu key exists without this
    /// entry's ownership marker.
    pub fn detect_conflicts(&self, entry: &ShortcutEntry) -> ManagerResult<()> {
        let menu = entry_menu_key(entry);
        let owner = self
            .read_owner(&menu)
            .map_err(|source| adapter_error(entry.id, source, RollbackOutcome::Clean))?;

        match owner {
            KeyOwner::Absent => Ok(()),
            KeyOwner::Entry(owner) if owner == entry.id => Ok(()),
            KeyOwner::Entry(owner) => Err(ManagerError::Conflict(format!(
                "registry key `{menu}` is owned by shortcut {owner}"
            ))),
            KeyOwner::Unmanaged => Err(ManagerError::Conflict(format!(
                "registry key `{menu}` exists and is not managed by ctxmenu"
            ))),
        }
    }

    /// Compares every stored entry with the registry. Never writes.
    pub fn describe_drift(&self) -> ManagerResult<Vec<DriftReport>> {
        let entries = self.store.list(&ShortcutFilter::all())?;
        let mut reports = Vec::with_capacity(entries.len());

        for entry in entries {
            let menu_key = entry_menu_key(&entry);
            let actual = self
                .presence(&entry, &menu_key)
                .map_err(|source| adapter_error(entry.id, source, RollbackOutcome::Clean))?;
            reports.push(DriftReport {
                entry_id: entry.id,
                expected_present: entry.enabled && entry.applied_state == AppliedState::Applied,
                name: entry.name,
                target_type: entry.target_type,
                menu_key,
                applied_state: entry.applied_state,
                actual,
            });
        }

        let drifted = reports.iter().filter(|report| report.is_drifted()).count();
        info!(
            "event=menu_drift module=manager status=ok entries={} drifted={drifted}",
            reports.len()
        );
        Ok(reports)
    }

    fn create_inner(&self, draft: &ShortcutDraft) -> ManagerResult<ShortcutEntry> {
        match self.store.create(draft) {
            Ok(entry) => {
                info!(
                    "event=shortcut_create module=manager status=ok id={} target={}",
                    entry.id, entry.target_type
                );
                self.record(AuditRecord::success(
                    AuditOperation::Create,
                    Some(entry.id),
                    format!("created `{}` for {}", entry.name, entry.target_type),
                ));
                Ok(entry)
            }
            Err(err) => {
                warn!(
                    "event=shortcut_create module=manager status=error target={} error={err}",
                    draft.target_type
                );
                self.record(AuditRecord::failure(
                    AuditOperation::Create,
                    None,
                    format!("`{}`: {err}", draft.name),
                ));
                Err(err.into())
            }
        }
    }

    fn update_inner(&self, id: ShortcutId, patch: &ShortcutPatch) -> ManagerResult<ShortcutEntry> {
        let before = self.load(AuditOperation::Update, id)?;
        let after = match self.store.update(id, patch) {
            Ok(entry) => entry,
            Err(err) => {
                self.record(AuditRecord::failure(
                    AuditOperation::Update,
                    Some(id),
                    err.to_string(),
                ));
                return Err(err.into());
            }
        };
        self.record(AuditRecord::success(
            AuditOperation::Update,
            Some(id),
            format!("updated `{}`", after.name),
        ));

        if before.applied_state != AppliedState::Applied {
            return Ok(after);
        }

        if let Err(err) = self.remove_owned_keys(&before) {
            self.mark_state(id, AppliedState::Failed);
            return Err(err);
        }

        if after.enabled {
            self.apply_inner(id)
        } else {
            self.commit_state(AuditOperation::Update, id, AppliedState::Removed)?;
            self.get(id)
        }
    }

    fn delete_inner(&self, id: ShortcutId) -> ManagerResult<()> {
        let entry = self.load(AuditOperation::Delete, id)?;

        if let Err(err) = self.remove_owned_keys(&entry) {
            self.mark_state(id, AppliedState::Failed);
            self.record(AuditRecord::failure(
                AuditOperation::Delete,
                Some(id),
                err.to_string(),
            ));
            return Err(err);
        }

        if let Err(err) = self.store.delete(id) {
            self.record(AuditRecord::failure(
                AuditOperation::Delete,
                Some(id),
                err.to_string(),
            ));
            return Err(err.into());
        }

        info!("event=shortcut_delete module=manager status=ok id={id}");
        self.record(AuditRecord::success(
            AuditOperation::Delete,
            Some(id),
            format!("deleted `{}`", entry.name),
        ));
        Ok(())
    }

    fn apply_inner(&self, id: ShortcutId) -> ManagerResult<ShortcutEntry> {
        let entry = self.load(AuditOperation::Apply, id)?;
        if !entry.enabled {
            self.record(AuditRecord::failure(
                AuditOperation::Apply,
                Some(id),
                "entry is disabled",
            ));
            return Err(ManagerError::Disabled(id));
        }

        let started_at = Instant::now();
        match self.apply_entry(&entry) {
            Ok(before) => {
                if let Err(err) = self.commit_state(AuditOperation::Apply, id, AppliedState::Applied)
                {
                    let menu = entry_menu_key(&entry);
                    let rollback = self.compensate(&before, &[menu.clone(), command_key(&menu)]);
                    warn!(
                        "event=menu_apply module=manager status=rollback id={id} reason=state_record clean={}",
                        rollback.is_clean()
                    );
                    return Err(err);
                }
                info!(
                    "event=menu_apply module=manager status=ok id={id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                self.record(AuditRecord::success(
                    AuditOperation::Apply,
                    Some(id),
                    format!("applied `{}` at `{}`", entry.name, entry_menu_key(&entry)),
                ));
                self.get(id)
            }
            Err(err) => {
                error!(
                    "event=menu_apply module=manager status=error id={id} duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                self.mark_state(id, AppliedState::Failed);
                self.record(AuditRecord::failure(
                    AuditOperation::Apply,
                    Some(id),
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }

    fn apply_batch_inner(&self, ids: &[ShortcutId]) -> ManagerResult<BatchReport> {
        let started_at = Instant::now();
        info!(
            "event=menu_apply_batch module=manager status=start entries={}",
            ids.len()
        );

        let mut applied: Vec<(ShortcutId, KeySnapshot)> = Vec::new();
        let mut report = BatchReport::default();

        for &id in ids {
            let entry = match self.get(id) {
                Ok(entry) => entry,
                Err(err) => return Err(self.fail_batch(id, err, applied)),
            };
            if !entry.enabled {
                debug!("event=menu_apply_batch module=manager status=skip id={id}");
                report.skipped.push(id);
                continue;
            }

            match self.apply_entry(&entry) {
                Ok(snapshot) => applied.push((id, snapshot)),
                Err(err) => return Err(self.fail_batch(id, err, applied)),
            }
        }

        let applied_ids: Vec<ShortcutId> = applied.iter().map(|(id, _)| *id).collect();
        if let Err(err) = self
            .store
            .record_applied_batch(&applied_ids, AppliedState::Applied)
        {
            return Err(match applied_ids.last() {
                Some(&failed_id) => self.fail_batch(failed_id, err.into(), applied),
                None => err.into(),
            });
        }
        for id in applied_ids {
            self.record(AuditRecord::success(
                AuditOperation::Apply,
                Some(id),
                "applied in batch",
            ));
            report.applied.push(id);
        }

        info!(
            "event=menu_apply_batch module=manager status=ok applied={} skipped={} duration_ms={}",
            report.applied.len(),
            report.skipped.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn remove_inner(&self, id: ShortcutId) -> ManagerResult<ShortcutEntry> {
        let entry = self.load(AuditOperation::Rollback, id)?;
        match self.remove_owned_keys(&entry) {
            Ok(removed) => {
                self.commit_state(AuditOperation::Rollback, id, AppliedState::Removed)?;
                info!("event=menu_remove module=manager status=ok id={id} removed={removed}");
                self.record(AuditRecord::success(
                    AuditOperation::Rollback,
                    Some(id),
                    if removed {
                        "removed registry keys"
                    } else {
                        "no registry keys to remove"
                    },
                ));
                self.get(id)
            }
            Err(err) => {
                self.mark_state(id, AppliedState::Failed);
                self.record(AuditRecord::failure(
                    AuditOperation::Rollback,
                    Some(id),
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }

    /// Takes the gate or fails with an audited `Busy`.
    fn enter(
        &self,
        operation: AuditOperation,
        entry_id: Option<ShortcutId>,
    ) -> ManagerResult<GateGuard> {
        match self.gate.try_enter() {
            Some(guard) => Ok(guard),
            None => {
                warn!(
                    "event=mutation_gate module=manager status=busy operation={}",
                    operation.as_str()
                );
                self.record(AuditRecord::failure(
                    operation,
                    entry_id,
                    ManagerError::Busy.to_string(),
                ));
                Err(ManagerError::Busy)
            }
        }
    }

    /// `get` for mutations: lookup failures are audited under `operation`.
    fn load(&self, operation: AuditOperation, id: ShortcutId) -> ManagerResult<ShortcutEntry> {
        self.get(id).map_err(|err| {
            self.record(AuditRecord::failure(operation, Some(id), err.to_string()));
            err
        })
    }

    /// `record_applied_state` with the failure audited under `operation`.
    fn commit_state(
        &self,
        operation: AuditOperation,
        id: ShortcutId,
        state: AppliedState,
    ) -> ManagerResult<()> {
        self.store.record_applied_state(id, state).map_err(|err| {
            error!(
                "event=state_record module=manager status=error id={id} state={state} error={err}"
            );
            self.record(AuditRecord::failure(
                operation,
                Some(id),
                format!("could not record {state} state: {err}"),
            ));
            ManagerError::from(err)
        })
    }

    fn preflight(&self, entry: &ShortcutEntry) -> ManagerResult<()> {
        entry
            .to_draft()
            .validate()
            .map_err(|err| ManagerError::Validation(err.to_string()))?;
        self.validator
            .validate(&entry.command)
            .into_result()
            .map_err(ManagerError::Validation)?;
        if let Some(icon_path) = entry.icon_path.as_deref() {
            self.validator
                .validate_icon_path(icon_path)
                .into_result()
                .map_err(|reason| ManagerError::Validation(format!("icon: {reason}")))?;
        }
        if !self.capabilities.supports(entry.menu_style) {
            return Err(ManagerError::Validation(format!(
                "{} menu style is not supported on this host",
                entry.menu_style
            )));
        }
        Ok(())
    }

    /// validate → conflict check → backup → staged writes with compensation.
    ///
    /// Returns the pre-apply snapshot of the menu key.
    fn apply_entry(&self, entry: &ShortcutEntry) -> ManagerResult<KeySnapshot> {
        self.preflight(entry)?;
        self.detect_conflicts(entry)?;

        let staged = layout::stage(entry);
        let before = self
            .registry
            .snapshot(&staged.menu_key)
            .map_err(|source| adapter_error(entry.id, source, RollbackOutcome::Clean))?;
        self.store.save_backup(entry.id, &before)?;

        let mut written: Vec<RegistryPath> = Vec::new();
        for write in &staged.writes {
            if let Err(source) = self.registry.write_key(&write.path, write.name, &write.value) {
                if !written.contains(&write.path) {
                    // a failed write may still have created the key
                    written.push(write.path.clone());
                }
                let rollback = self.compensate(&before, &written);
                warn!(
                    "event=menu_apply module=manager status=rollback id={} writes_done={} clean={}",
                    entry.id,
                    written.len(),
                    rollback.is_clean()
                );
                return Err(adapter_error(entry.id, source, rollback));
            }
            if !written.contains(&write.path) {
                written.push(write.path.clone());
            }
        }

        debug!(
            "event=menu_apply module=manager status=written id={} keys={} command={}",
            entry.id,
            written.len(),
            entry.command
        );
        Ok(before)
    }

    /// Undoes a partial apply. Keys that pre-existed get their snapshot back;
    /// keys created by this apply are deleted in reverse order.
    fn compensate(&self, before: &KeySnapshot, written: &[RegistryPath]) -> RollbackOutcome {
        if before.exists {
            return match self.registry.restore_snapshot(before) {
                Ok(()) => RollbackOutcome::Clean,
                Err(err) => {
                    error!(
                        "event=menu_rollback module=manager status=error path={} error={err}",
                        before.path
                    );
                    RollbackOutcome::Partial {
                        leftover: vec![before.path.clone()],
                    }
                }
            };
        }

        let mut leftover = Vec::new();
        for path in written.iter().rev() {
            if let Ok(false) = self.registry.key_exists(path) {
                continue;
            }
            match self.registry.delete_key(path) {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    error!(
                        "event=menu_rollback module=manager status=error path={path} error={err}"
                    );
                    leftover.push(path.clone());
                }
            }
        }
        RollbackOutcome::from_leftover(leftover)
    }

    fn fail_batch(
        &self,
        failed_id: ShortcutId,
        cause: ManagerError,
        applied: Vec<(ShortcutId, KeySnapshot)>,
    ) -> ManagerError {
        let mut rolled_back = Vec::new();
        let mut leftover = Vec::new();

        for (id, snapshot) in applied.into_iter().rev() {
            match self.registry.restore_snapshot(&snapshot) {
                Ok(()) => rolled_back.push(id),
                Err(err) => {
                    error!(
                        "event=menu_apply_batch module=manager status=rollback_error id={id} path={} error={err}",
                        snapshot.path
                    );
                    leftover.push(snapshot.path);
                }
            }
        }
        let rollback = RollbackOutcome::from_leftover(leftover);

        if !matches!(cause, ManagerError::NotFound(_)) {
            self.mark_state(failed_id, AppliedState::Failed);
        }
        error!(
            "event=menu_apply_batch module=manager status=error failed_id={failed_id} restored={} clean={} error={cause}",
            rolled_back.len(),
            rollback.is_clean()
        );
        self.record(AuditRecord::failure(
            AuditOperation::Apply,
            Some(failed_id),
            format!("batch: {cause}"),
        ));
        let rollback_record = format!(
            "batch rollback restored {} entr(ies); {rollback}",
            rolled_back.len()
        );
        self.record(if rollback.is_clean() {
            AuditRecord::success(AuditOperation::Rollback, None, rollback_record)
        } else {
            AuditRecord::failure(AuditOperation::Rollback, None, rollback_record)
        });

        ManagerError::Batch(BatchFailure {
            failed_id,
            cause: Box::new(cause),
            rolled_back,
            rollback,
        })
    }

    /// Deletes the menu subtree when this entry owns it.
    ///
    /// Returns whether anything was deleted.
    fn remove_owned_keys(&self, entry: &ShortcutEntry) -> ManagerResult<bool> {
        let menu = entry_menu_key(entry);
        let owner = self
            .read_owner(&menu)
            .map_err(|source| adapter_error(entry.id, source, RollbackOutcome::Clean))?;

        match owner {
            KeyOwner::Absent => return Ok(false),
            KeyOwner::Entry(owner) if owner == entry.id => {}
            KeyOwner::Entry(owner) => {
                warn!(
                    "event=menu_remove module=manager status=skip id={} owner={owner} reason=foreign_owner",
                    entry.id
                );
                return Ok(false);
            }
            KeyOwner::Unmanaged => {
                warn!(
                    "event=menu_remove module=manager status=skip id={} reason=unmanaged_key",
                    entry.id
                );
                return Ok(false);
            }
        }

        match self.registry.delete_key(&menu) {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(source) => Err(adapter_error(entry.id, source, RollbackOutcome::Clean)),
        }
    }

    fn read_owner(&self, menu: &RegistryPath) -> Result<KeyOwner, AdapterError> {
        if !self.registry.key_exists(menu)? {
            return Ok(KeyOwner::Absent);
        }
        Ok(
            match self
                .registry
                .read_value(menu, OWNER_VALUE_NAME)?
                .as_deref()
                .and_then(parse_owner)
            {
                Some(owner) => KeyOwner::Entry(owner),
                None => KeyOwner::Unmanaged,
            },
        )
    }

    fn presence(
        &self,
        entry: &ShortcutEntry,
        menu: &RegistryPath,
    ) -> Result<RegistryPresence, AdapterError> {
        match self.read_owner(menu)? {
            KeyOwner::Absent => Ok(RegistryPresence::Absent),
            KeyOwner::Entry(owner) if owner == entry.id => {
                let command = self
                    .registry
                    .read_value(&command_key(menu), DEFAULT_VALUE_NAME)?;
                let style = self
                    .registry
                    .read_value(menu, STYLE_VALUE_NAME)?
                    .as_deref()
                    .map(parse_style);
                if command.as_deref() == Some(entry.command.as_str())
                    && style == Some(entry.menu_style)
                {
                    Ok(RegistryPresence::Owned)
                } else {
                    Ok(RegistryPresence::Stale)
                }
            }
            KeyOwner::Entry(_) | KeyOwner::Unmanaged => Ok(RegistryPresence::Foreign),
        }
    }

    fn mark_state(&self, id: ShortcutId, state: AppliedState) {
        if let Err(err) = self.store.record_applied_state(id, state) {
            error!(
                "event=state_record module=manager status=error id={id} state={state} error={err}"
            );
        }
    }

    fn record(&self, record: AuditRecord) {
        if let Err(err) = self.audit.append(&record) {
            error!(
                "event=audit_append module=manager status=error operation={} outcome={} error={err}",
                record.operation.as_str(),
                record.outcome.as_str()
            );
        }
    }
}

enum KeyOwner {
    Absent,
    Entry(ShortcutId),
    Unmanaged,
}

fn adapter_error(
    entry_id: ShortcutId,
    source: AdapterError,
    rollback: RollbackOutcome,
) -> ManagerError {
    ManagerError::Adapter {
        entry_id,
        source,
        rollback,
    }
}
