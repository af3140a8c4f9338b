//! Audit sink contract and SQLite implementation.
//!
//! # Responsibility
//! - Append immutable audit records.
//! - Read the most recent records for operator review.
//!
//! # Invariants
//! - Records are never updated or deleted; triggers in the schema abort
//!   any attempt.

use super::shortcut_repo::{StoreError, StoreResult};
use crate::model::audit::{AuditOperation, AuditOutcome, AuditRecord};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Append-only audit trail.
pub trait AuditSink {
    fn append(&self, record: &AuditRecord) -> StoreResult<()>;
    /// Newest first, at most `limit` records.
    fn recent(&self, limit: u32) -> StoreResult<Vec<AuditRecord>>;
}

/// SQLite-backed audit log.
pub struct SqliteAuditLog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuditLog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AuditSink for SqliteAuditLog<'_> {
    fn append(&self, record: &AuditRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO audit_log (
                timestamp_ms,
                operation,
                entry_uuid,
                outcome,
                detail
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                record.timestamp_ms,
                record.operation.as_str(),
                record.entry_id.map(|id| id.to_string()),
                record.outcome.as_str(),
                record.detail.as_str(),
            ],
        )?;
        Ok(())
    }

    fn recent(&self, limit: u32) -> StoreResult<Vec<AuditRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp_ms, operation, entry_uuid, outcome, detail
             FROM audit_log
             ORDER BY id DESC
             LIMIT ?1;",
        )?;
        let mut rows = stmt.query([i64::from(limit)])?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            records.push(parse_audit_row(row)?);
        }

        Ok(records)
    }
}

fn parse_audit_row(row: &Row<'_>) -> StoreResult<AuditRecord> {
    let operation_text: String = row.get("operation")?;
    let operation = AuditOperation::parse(&operation_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid operation `{operation_text}` in audit_log.operation"
        ))
    })?;

    let outcome_text: String = row.get("outcome")?;
    let outcome = AuditOutcome::parse(&outcome_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid outcome `{outcome_text}` in audit_log.outcome"
        ))
    })?;

    let entry_id = match row.get::<_, Option<String>>("entry_uuid")? {
        Some(text) => Some(Uuid::parse_str(&text).map_err(|_| {
            StoreError::InvalidData(format!("invalid uuid value `{text}` in audit_log.entry_uuid"))
        })?),
        None => None,
    };

    Ok(AuditRecord {
        timestamp_ms: row.get("timestamp_ms")?,
        operation,
        entry_id,
        outcome,
        detail: row.get("detail")?,
    })
}
