use ctxmenu_core::db::open_db_in_memory;
use ctxmenu_core::registry::layout::menu_key;
use ctxmenu_core::registry::KeySnapshot;
use ctxmenu_core::{
    AppliedState, AuditOperation, AuditOutcome, AuditSink, ManagerError, MemoryRegistry,
    MenuManager, RegistryAdapter, RegistryBackup, RollbackOutcome, SecurityValidator,
    ShortcutDraft, ShortcutEntry, ShortcutFilter, ShortcutId, ShortcutPatch, ShortcutStore,
    SqliteAuditLog, SqliteShortcutStore, StaticCapabilities, StoreError, StoreResult, TargetType,
};
use rusqlite::Connection;
use uuid::Uuid;

type TestManager<'a> = MenuManager<
    SqliteShortcutStore<'a>,
    SqliteAuditLog<'a>,
    &'a MemoryRegistry,
    StaticCapabilities,
>;

fn manager<'a>(conn: &'a Connection, registry: &'a MemoryRegistry) -> TestManager<'a> {
    let validator = SecurityValidator::default();
    MenuManager::new(
        SqliteShortcutStore::new(conn, validator.clone()),
        SqliteAuditLog::new(conn),
        registry,
        StaticCapabilities::default(),
        validator,
    )
}

struct Catalog {
    edit: ShortcutEntry,
    open_here: ShortcutEntry,
    terminal: ShortcutEntry,
    scan: ShortcutEntry,
}

fn seed(manager: &mut TestManager<'_>) -> Catalog {
    Catalog {
        edit: manager
            .create(&ShortcutDraft::new("Edit", "notepad \"%1\"", TargetType::File))
            .unwrap(),
        open_here: manager
            .create(&ShortcutDraft::new("Open here", "code \"%1\"", TargetType::Folder))
            .unwrap(),
        terminal: manager
            .create(&ShortcutDraft::new("Terminal", "wt -d \"%V\"", TargetType::Background))
            .unwrap(),
        scan: manager
            .create(&ShortcutDraft::new("Scan", "explorer \"%1\"", TargetType::Drive))
            .unwrap(),
    }
}

fn ids(catalog: &Catalog) -> Vec<Uuid> {
    vec![
        catalog.edit.id,
        catalog.open_here.id,
        catalog.terminal.id,
        catalog.scan.id,
    ]
}

#[test]
fn batch_applies_all_entries_and_records_state_once() {
    let conn = open_db_in_memory().unwrap();
    let registry = MemoryRegistry::new();
    let mut manager = manager(&conn, &registry);
    let catalog = seed(&mut manager);

    let report = manager.apply_batch(&ids(&catalog)).unwrap();

    assert_eq!(report.applied, ids(&catalog));
    assert!(report.skipped.is_empty());
    for id in ids(&catalog) {
        let entry = manager.get(id).unwrap();
        assert_eq!(entry.applied_state, AppliedState::Applied);
        assert_eq!(entry.apply_count, 1);
    }
    assert!(registry
        .key_exists(&menu_key(TargetType::Drive, "Scan"))
        .unwrap());

    let records = manager.audit().recent(4).unwrap();
    assert!(records.iter().all(|record| {
        record.operation == AuditOperation::Apply && record.outcome == AuditOutcome::Success
    }));
}

#[test]
fn batch_skips_disabled_entries() {
    let conn = open_db_in_memory().unwrap();
    let registry = MemoryRegistry::new();
    let mut manager = manager(&conn, &registry);
    let edit = manager
        .create(&ShortcutDraft::new("Edit", "notepad \"%1\"", TargetType::File))
        .unwrap();
    let parked = manager
        .create(&ShortcutDraft::new("Parked", "calc", TargetType::File).disabled())
        .unwrap();

    let report = manager.apply_batch(&[edit.id, parked.id]).unwrap();

    assert_eq!(report.applied, vec![edit.id]);
    assert_eq!(report.skipped, vec![parked.id]);
    assert!(!registry
        .key_exists(&menu_key(TargetType::File, "Parked"))
        .unwrap());
    assert_eq!(
        manager.get(parked.id).unwrap().applied_state,
        AppliedState::Pending
    );
}

#[test]
fn failure_midway_restores_earlier_entries_and_stops() {
    let conn = open_db_in_memory().unwrap();
    let registry = MemoryRegistry::new();
    let mut manager = manager(&conn, &registry);
    let catalog = seed(&mut manager);

    // Edit was applied before the batch; its keys must survive the rollback.
    manager.apply(catalog.edit.id).unwrap();
    let edit_menu = menu_key(TargetType::File, "Edit");
    let edit_before = registry.snapshot(&edit_menu).unwrap();

    registry.fail_writes_matching("\\background\\shell\\terminal");
    let err = manager.apply_batch(&ids(&catalog)).unwrap_err();

    let failure = match err {
        ManagerError::Batch(failure) => failure,
        other => panic!("unexpected error: {other}"),
    };
    assert_eq!(failure.failed_id, catalog.terminal.id);
    assert!(matches!(*failure.cause, ManagerError::Adapter { .. }));
    assert_eq!(
        failure.rolled_back,
        vec![catalog.open_here.id, catalog.edit.id]
    );
    assert_eq!(failure.rollback, RollbackOutcome::Clean);

    assert_eq!(registry.snapshot(&edit_menu).unwrap(), edit_before);
    assert!(!registry
        .key_exists(&menu_key(TargetType::Folder, "Open here"))
        .unwrap());
    assert!(!registry
        .key_exists(&menu_key(TargetType::Background, "Terminal"))
        .unwrap());
    assert!(registry
        .key_paths()
        .iter()
        .all(|path| !path.as_str().contains("\\Drive\\")));

    let edit = manager.get(catalog.edit.id).unwrap();
    assert_eq!(edit.applied_state, AppliedState::Applied);
    assert_eq!(edit.apply_count, 1);
    assert_eq!(
        manager.get(catalog.open_here.id).unwrap().applied_state,
        AppliedState::Pending
    );
    assert_eq!(
        manager.get(catalog.terminal.id).unwrap().applied_state,
        AppliedState::Failed
    );
    assert_eq!(
        manager.get(catalog.scan.id).unwrap().applied_state,
        AppliedState::Pending
    );

    let records = manager.audit().recent(2).unwrap();
    assert_eq!(records[0].operation, AuditOperation::Rollback);
    assert_eq!(records[0].outcome, AuditOutcome::Success);
    assert_eq!(records[0].entry_id, None);
    assert_eq!(records[1].operation, AuditOperation::Apply);
    assert_eq!(records[1].outcome, AuditOutcome::Failure);
    assert_eq!(records[1].entry_id, Some(catalog.terminal.id));
}

#[test]
fn unmanaged_key_stops_batch_with_conflict() {
    let conn = open_db_in_memory().unwrap();
    let registry = MemoryRegistry::new();
    let mut manager = manager(&conn, &registry);
    let catalog = seed(&mut manager);
    registry
        .write_key(&menu_key(TargetType::Folder, "Open here"), "", "vendor entry")
        .unwrap();

    let err = manager.apply_batch(&ids(&catalog)).unwrap_err();

    match err {
        ManagerError::Batch(failure) => {
            assert_eq!(failure.failed_id, catalog.open_here.id);
            assert!(matches!(*failure.cause, ManagerError::Conflict(_)));
            assert_eq!(failure.rolled_back, vec![catalog.edit.id]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!registry
        .key_exists(&menu_key(TargetType::File, "Edit"))
        .unwrap());
    assert_eq!(
        registry
            .value(&menu_key(TargetType::Folder, "Open here"), "")
            .as_deref(),
        Some("vendor entry")
    );
}

#[test]
fn unknown_id_stops_batch_and_rolls_back() {
    let conn = open_db_in_memory().unwrap();
    let registry = MemoryRegistry::new();
    let mut manager = manager(&conn, &registry);
    let catalog = seed(&mut manager);
    let missing = Uuid::new_v4();

    let err = manager
        .apply_batch(&[catalog.edit.id, missing, catalog.scan.id])
        .unwrap_err();

    match err {
        ManagerError::Batch(failure) => {
            assert_eq!(failure.failed_id, missing);
            assert!(matches!(*failure.cause, ManagerError::NotFound(id) if id == missing));
            assert_eq!(failure.rolled_back, vec![catalog.edit.id]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!registry
        .key_exists(&menu_key(TargetType::File, "Edit"))
        .unwrap());
}

#[test]
fn failed_restore_is_reported_as_partial() {
    let conn = open_db_in_memory().unwrap();
    let registry = MemoryRegistry::new();
    let mut manager = manager(&conn, &registry);
    let catalog = seed(&mut manager);
    registry.fail_writes_matching("\\background\\shell\\terminal");
    registry.fail_deletes_matching("\\directory\\shell\\open here");

    let err = manager.apply_batch(&ids(&catalog)).unwrap_err();

    match err {
        ManagerError::Batch(failure) => {
            assert_eq!(failure.rolled_back, vec![catalog.edit.id]);
            assert_eq!(
                failure.rollback,
                RollbackOutcome::Partial {
                    leftover: vec![menu_key(TargetType::Folder, "Open here")]
                }
            );
        }
        other => panic!("unexpected error: {other}"),
    }

    let rollback_record = &manager.audit().recent(1).unwrap()[0];
    assert_eq!(rollback_record.operation, AuditOperation::Rollback);
    assert_eq!(rollback_record.outcome, AuditOutcome::Failure);
}

struct CommitFailingStore<'a>(SqliteShortcutStore<'a>);

impl ShortcutStore for CommitFailingStore<'_> {
    fn create(&self, draft: &ShortcutDraft) -> StoreResult<ShortcutEntry> {
        self.0.create(draft)
    }

    fn update(&self, id: ShortcutId, patch: &ShortcutPatch) -> StoreResult<ShortcutEntry> {
        self.0.update(id, patch)
    }

    fn delete(&self, id: ShortcutId) -> StoreResult<()> {
        self.0.delete(id)
    }

    fn get(&self, id: ShortcutId) -> StoreResult<Option<ShortcutEntry>> {
        self.0.get(id)
    }

    fn list(&self, filter: &ShortcutFilter) -> StoreResult<Vec<ShortcutEntry>> {
        self.0.list(filter)
    }

    fn record_applied_state(&self, id: ShortcutId, state: AppliedState) -> StoreResult<()> {
        self.0.record_applied_state(id, state)
    }

    fn record_applied_batch(&self, _ids: &[ShortcutId], _state: AppliedState) -> StoreResult<()> {
        Err(StoreError::InvalidData("disk I/O error".to_string()))
    }

    fn save_backup(&self, entry_id: ShortcutId, snapshot: &KeySnapshot) -> StoreResult<i64> {
        self.0.save_backup(entry_id, snapshot)
    }

    fn latest_backup(&self, entry_id: ShortcutId) -> StoreResult<Option<RegistryBackup>> {
        self.0.latest_backup(entry_id)
    }
}

#[test]
fn failed_state_commit_restores_registry() {
    let conn = open_db_in_memory().unwrap();
    let registry = MemoryRegistry::new();
    let validator = SecurityValidator::default();
    let mut manager = MenuManager::new(
        CommitFailingStore(SqliteShortcutStore::new(&conn, validator.clone())),
        SqliteAuditLog::new(&conn),
        &registry,
        StaticCapabilities::default(),
        validator,
    );
    let edit = manager
        .create(&ShortcutDraft::new("Edit", "notepad \"%1\"", TargetType::File))
        .unwrap();
    let open_here = manager
        .create(&ShortcutDraft::new("Open here", "code \"%1\"", TargetType::Folder))
        .unwrap();

    let err = manager.apply_batch(&[edit.id, open_here.id]).unwrap_err();

    let ManagerError::Batch(failure) = err else {
        panic!("expected batch failure, got {err}");
    };
    assert!(matches!(*failure.cause, ManagerError::Store(_)));
    assert_eq!(failure.rolled_back, vec![open_here.id, edit.id]);
    assert_eq!(failure.rollback, RollbackOutcome::Clean);
    assert!(!registry
        .key_exists(&menu_key(TargetType::File, "Edit"))
        .unwrap());
    assert!(!registry
        .key_exists(&menu_key(TargetType::Folder, "Open here"))
        .unwrap());
    assert_eq!(manager.get(edit.id).unwrap().apply_count, 0);

    let records = manager.audit().recent(2).unwrap();
    assert_eq!(records[0].operation, AuditOperation::Rollback);
    assert_eq!(records[0].outcome, AuditOutcome::Success);
    assert_eq!(records[1].operation, AuditOperation::Apply);
    assert_eq!(records[1].outcome, AuditOutcome::Failure);
}
