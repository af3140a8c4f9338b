use ctxmenu_core::db::migrations::{apply_migrations, latest_version, schema_version};
use ctxmenu_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "shortcuts");
    assert_table_exists(&conn, "audit_log");
    assert_table_exists(&conn, "registry_backups");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctxmenu.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute(
            "INSERT INTO shortcuts (uuid, name, command, target_type, menu_style)
             VALUES ('00000000-0000-4000-8000-000000000001', 'Edit', 'notepad', 'file', 'classic');",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second).unwrap(), latest_version());
    let rows: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM shortcuts;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failed_migration_names_its_version_and_keeps_old_schema() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "PRAGMA user_version = 2;
         CREATE VIEW registry_backups AS SELECT 1 AS id, 'x' AS entry_uuid;",
    )
    .unwrap();

    let err = apply_migrations(&mut conn).unwrap_err();

    assert!(matches!(err, DbError::Migration { version: 3, .. }));
    assert_eq!(schema_version(&conn).unwrap(), 2);
}

#[test]
fn schema_rejects_unknown_target_type() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO shortcuts (uuid, name, command, target_type, menu_style)
         VALUES ('00000000-0000-4000-8000-000000000002', 'Edit', 'notepad', 'desktop', 'classic');",
        [],
    );
    assert!(result.is_err());
}

#[test]
fn enabled_name_index_is_case_insensitive_per_target() {
    let conn = open_db_in_memory().unwrap();
    let insert = |uuid: &str, name: &str, target: &str, enabled: i64| {
        conn.execute(
            "INSERT INTO shortcuts (uuid, name, command, target_type, menu_style, is_enabled)
             VALUES (?1, ?2, 'notepad', ?3, 'classic', ?4);",
            rusqlite::params![uuid, name, target, enabled],
        )
    };

    insert("00000000-0000-4000-8000-00000000000a", "Open", "file", 1).unwrap();
    assert!(insert("00000000-0000-4000-8000-00000000000b", "OPEN", "file", 1).is_err());
    insert("00000000-0000-4000-8000-00000000000c", "OPEN", "file", 0).unwrap();
    insert("00000000-0000-4000-8000-00000000000d", "Open", "folder", 1).unwrap();
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
