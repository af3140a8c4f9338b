use ctxmenu_core::db::open_db_in_memory;
use ctxmenu_core::service::interchange::{from_json, to_json, FORMAT_VERSION};
use ctxmenu_core::{
    AppliedState, AuditOperation, AuditOutcome, AuditSink, FormatError, ImportExport,
    InterchangeDocument, InterchangeRecord, ManagerError, MenuStyle, MutationGate,
    SecurityValidator, ShortcutDraft, ShortcutFilter, ShortcutStore, SqliteAuditLog,
    SqliteShortcutStore, TargetType,
};

fn record(name: &str, command: &str, target_type: TargetType) -> InterchangeRecord {
    InterchangeRecord {
        name: name.to_string(),
        command: command.to_string(),
        target_type,
        menu_style: MenuStyle::Classic,
        enabled: true,
        icon_path: None,
    }
}

#[test]
fn export_then_import_reproduces_catalog() {
    let source = open_db_in_memory().unwrap();
    let store = SqliteShortcutStore::new(&source, SecurityValidator::default());
    let audit = SqliteAuditLog::new(&source);
    store
        .create(&ShortcutDraft::new("Edit", "notepad \"%1\"", TargetType::File))
        .unwrap();
    store
        .create(
            &ShortcutDraft::new("Terminal", "wt -d \"%V\"", TargetType::Background)
                .with_menu_style(MenuStyle::Modern),
        )
        .unwrap();
    let applied = store
        .create(&ShortcutDraft::new("Scan", "explorer \"%1\"", TargetType::Drive).disabled())
        .unwrap();
    store
        .record_applied_state(applied.id, AppliedState::Applied)
        .unwrap();

    let exported = ImportExport::new(&store, &audit).export_all().unwrap();
    assert_eq!(exported.format_version, FORMAT_VERSION);
    let text = to_json(&exported).unwrap();
    assert!(text.contains("\"formatVersion\": 1"));
    assert!(!text.contains("appliedState"));

    let target = open_db_in_memory().unwrap();
    let target_store = SqliteShortcutStore::new(&target, SecurityValidator::default());
    let target_audit = SqliteAuditLog::new(&target);
    let report = ImportExport::new(&target_store, &target_audit)
        .import_json(&text)
        .unwrap();

    assert_eq!(report.imported, 3);
    assert_eq!(report.skipped, 0);
    let imported = target_store.list(&ShortcutFilter::all()).unwrap();
    let names: Vec<&str> = imported.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["Edit", "Terminal", "Scan"]);
    assert_eq!(imported[1].menu_style, MenuStyle::Modern);
    assert!(!imported[2].enabled);
    assert!(imported
        .iter()
        .all(|entry| entry.applied_state == AppliedState::Pending && entry.apply_count == 0));

    let export_record = &audit.recent(1).unwrap()[0];
    assert_eq!(export_record.operation, AuditOperation::Export);
    let import_record = &target_audit.recent(1).unwrap()[0];
    assert_eq!(import_record.operation, AuditOperation::Import);
    assert_eq!(import_record.outcome, AuditOutcome::Success);
    assert!(import_record.detail.contains("imported 3"));
}

#[test]
fn import_skips_duplicates_and_invalid_entries_with_reasons() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteShortcutStore::new(&conn, SecurityValidator::default());
    let audit = SqliteAuditLog::new(&conn);
    store
        .create(&ShortcutDraft::new("Edit", "notepad \"%1\"", TargetType::File))
        .unwrap();

    let document = InterchangeDocument::new(vec![
        record("EDIT", "code \"%1\"", TargetType::File),
        record("Edit", "code \"%1\"", TargetType::Folder),
        record("Wipe", "format C: /y", TargetType::Drive),
        record("View", "notepad \"%1\"", TargetType::Folder),
        record("view", "notepad \"%1\"", TargetType::Folder),
    ]);

    let report = ImportExport::new(&store, &audit)
        .import_document(&document)
        .unwrap();

    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped, 3);
    let indices: Vec<usize> = report.errors.iter().map(|issue| issue.index).collect();
    assert_eq!(indices, vec![0, 2, 4]);
    assert_eq!(report.errors[0].reason, "duplicate of an existing shortcut");
    assert_eq!(report.errors[0].name, "EDIT");
    assert!(report.errors[1].reason.contains("filesystem format"));
    assert_eq!(report.errors[2].reason, "duplicate of an existing shortcut");

    assert_eq!(store.list(&ShortcutFilter::all()).unwrap().len(), 3);
}

#[test]
fn future_version_is_rejected_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteShortcutStore::new(&conn, SecurityValidator::default());
    let audit = SqliteAuditLog::new(&conn);
    let text = r#"{
        "formatVersion": 2,
        "shortcuts": [{"name": "Edit", "command": "notepad", "targetType": "file", "extra": {}}]
    }"#;

    let err = ImportExport::new(&store, &audit)
        .import_json(text)
        .unwrap_err();

    assert!(matches!(
        err,
        ManagerError::Format(FormatError::UnsupportedVersion {
            found: 2,
            supported: 1
        })
    ));
    assert!(store.list(&ShortcutFilter::all()).unwrap().is_empty());
    let audit_record = &audit.recent(1).unwrap()[0];
    assert_eq!(audit_record.operation, AuditOperation::Import);
    assert_eq!(audit_record.outcome, AuditOutcome::Failure);
}

#[test]
fn malformed_documents_are_rejected() {
    assert!(matches!(
        from_json("not json"),
        Err(FormatError::Malformed(_))
    ));
    assert!(matches!(
        from_json(r#"{"shortcuts": []}"#),
        Err(FormatError::Malformed(_))
    ));
    assert!(matches!(
        from_json(r#"{"formatVersion": 0, "shortcuts": []}"#),
        Err(FormatError::UnsupportedVersion { found: 0, .. })
    ));
    assert!(matches!(
        from_json(
            r#"{"formatVersion": 1, "shortcuts": [{"name": "A", "command": "calc", "targetType": "printer"}]}"#
        ),
        Err(FormatError::Malformed(_))
    ));
}

#[test]
fn oversized_document_is_rejected_whole() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteShortcutStore::new(&conn, SecurityValidator::default());
    let audit = SqliteAuditLog::new(&conn);
    let document = InterchangeDocument::new(
        (0..3)
            .map(|index| record(&format!("Entry {index}"), "calc", TargetType::File))
            .collect(),
    );

    let err = ImportExport::new(&store, &audit)
        .with_max_entries(2)
        .import_document(&document)
        .unwrap_err();

    assert!(matches!(
        err,
        ManagerError::Format(FormatError::TooManyEntries { count: 3, max: 2 })
    ));
    assert!(store.list(&ShortcutFilter::all()).unwrap().is_empty());
}

#[test]
fn missing_optional_fields_use_defaults() {
    let document = from_json(
        r#"{"formatVersion": 1, "shortcuts": [{"name": "Edit", "command": "notepad", "targetType": "file"}]}"#,
    )
    .unwrap();

    let only = &document.shortcuts[0];
    assert!(only.enabled);
    assert_eq!(only.menu_style, MenuStyle::Classic);
    assert_eq!(only.icon_path, None);
    assert_eq!(document.exported_at_ms, 0);
}

#[test]
fn disabled_twin_of_enabled_entry_survives_round_trip() {
    let source = open_db_in_memory().unwrap();
    let store = SqliteShortcutStore::new(&source, SecurityValidator::default());
    let audit = SqliteAuditLog::new(&source);
    store
        .create(&ShortcutDraft::new("Open", "notepad \"%1\"", TargetType::File).disabled())
        .unwrap();
    store
        .create(&ShortcutDraft::new("OPEN", "code \"%1\"", TargetType::File))
        .unwrap();
    let text = to_json(&ImportExport::new(&store, &audit).export_all().unwrap()).unwrap();

    let target = open_db_in_memory().unwrap();
    let target_store = SqliteShortcutStore::new(&target, SecurityValidator::default());
    let target_audit = SqliteAuditLog::new(&target);
    let importer = ImportExport::new(&target_store, &target_audit);
    let report = importer.import_json(&text).unwrap();

    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped, 0);
    let imported = target_store.list(&ShortcutFilter::all()).unwrap();
    assert_eq!(imported.len(), 2);
    assert!(!imported[0].enabled);
    assert!(imported[1].enabled);
    assert_eq!(imported[1].command, "code \"%1\"");

    let again = importer.import_json(&text).unwrap();
    assert_eq!(again.imported, 0);
    assert_eq!(again.skipped, 2);
}

#[test]
fn import_is_busy_while_gate_is_held() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteShortcutStore::new(&conn, SecurityValidator::default());
    let audit = SqliteAuditLog::new(&conn);
    let gate = MutationGate::new();
    let _held = gate.try_enter().unwrap();

    let err = ImportExport::new(&store, &audit)
        .with_gate(gate.clone())
        .import_document(&InterchangeDocument::new(vec![record(
            "Edit",
            "notepad",
            TargetType::File,
        )]))
        .unwrap_err();

    assert!(matches!(err, ManagerError::Busy));
    assert!(store.list(&ShortcutFilter::all()).unwrap().is_empty());
    assert_eq!(audit.recent(1).unwrap()[0].outcome, AuditOutcome::Failure);
}
