//! Audit trail model.
//!
//! # Invariants
//! - An `AuditRecord` is immutable once appended to a sink.
//! - Every failed mutating operation produces a record with `Failure`.

use crate::model::shortcut::ShortcutId;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Mutating operation kinds recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
    Import,
    Export,
    Apply,
    Rollback,
}

impl AuditOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
            Self::Export => "export",
            Self::Apply => "apply",
            Self::Rollback => "rollback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "import" => Some(Self::Import),
            "export" => Some(Self::Export),
            "apply" => Some(Self::Apply),
            "rollback" => Some(Self::Rollback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Epoch milliseconds at record creation.
    pub timestamp_ms: i64,
    pub operation: AuditOperation,
    /// `None` for catalog-wide operations such as import/export.
    pub entry_id: Option<ShortcutId>,
    pub outcome: AuditOutcome,
    /// Free text; carries the rejection or failure reason on failure.
    pub detail: String,
}

impl AuditRecord {
    pub fn success(
        operation: AuditOperation,
        entry_id: Option<ShortcutId>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(operation, entry_id, AuditOutcome::Success, detail)
    }

    pub fn failure(
        operation: AuditOperation,
        entry_id: Option<ShortcutId>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(operation, entry_id, AuditOutcome::Failure, detail)
    }

    fn new(
        operation: AuditOperation,
        entry_id: Option<ShortcutId>,
        outcome: AuditOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_ms: now_epoch_ms(),
            operation,
            entry_id,
            outcome,
            detail: detail.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == AuditOutcome::Failure
    }
}

/// Current wall clock in epoch milliseconds; `0` if the clock is before 1970.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
