//! Versioned JSON interchange for shortcut catalogs.
//!
//! # Responsibility
//! - Export every stored entry without registry sync state.
//! - Import a document entry by entry, skipping invalid and duplicate
//!   entries with a reason each.
//!
//! # Invariants
//! - Documents with an unknown or future `formatVersion` are rejected whole.
//! - Documents above the entry limit are rejected whole.
//! - Imported entries start in `Pending` state; import never touches the
//!   registry.
//! - Name uniqueness follows the store: only enabled entries of one target
//!   collide, so disabled copies of a name import alongside an enabled one.
//! - Import holds the `MutationGate` for the whole document.

use crate::config::DEFAULT_MAX_IMPORT_COUNT;
use crate::model::audit::{now_epoch_ms, AuditOperation, AuditRecord};
use crate::model::shortcut::{MenuStyle, ShortcutDraft, ShortcutEntry, TargetType};
use crate::repo::audit_repo::AuditSink;
use crate::repo::shortcut_repo::{ShortcutFilter, ShortcutStore, StoreError};
use crate::service::gate::MutationGate;
use crate::service::menu_manager::ManagerError;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Interchange format version written by this build.
pub const FORMAT_VERSION: u32 = 1;

/// Whole-document rejection.
#[derive(Debug)]
pub enum FormatError {
    UnsupportedVersion { found: u64, supported: u32 },
    TooManyEntries { count: usize, max: usize },
    Malformed(String),
}

impl Display for FormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedVersion { found, supported } => write!(
                f,
                "unsupported interchange format version {found} (supported: {supported})"
            ),
            Self::TooManyEntries { count, max } => {
                write!(f, "document has {count} entries, max {max}")
            }
            Self::Malformed(message) => write!(f, "malformed interchange document: {message}"),
        }
    }
}

impl Error for FormatError {}

/// Serialized catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterchangeDocument {
    pub format_version: u32,
    #[serde(default)]
    pub exported_at_ms: i64,
    #[serde(default)]
    pub shortcuts: Vec<InterchangeRecord>,
}

impl InterchangeDocument {
    pub fn new(shortcuts: Vec<InterchangeRecord>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            exported_at_ms: now_epoch_ms(),
            shortcuts,
        }
    }
}

/// Portable subset of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterchangeRecord {
    pub name: String,
    pub command: String,
    pub target_type: TargetType,
    #[serde(default)]
    pub menu_style: MenuStyle,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl From<&ShortcutEntry> for InterchangeRecord {
    fn from(entry: &ShortcutEntry) -> Self {
        Self {
            name: entry.name.clone(),
            command: entry.command.clone(),
            target_type: entry.target_type,
            menu_style: entry.menu_style,
            enabled: entry.enabled,
            icon_path: entry.icon_path.clone(),
        }
    }
}

impl InterchangeRecord {
    pub fn to_draft(&self) -> ShortcutDraft {
        ShortcutDraft {
            name: self.name.clone(),
            command: self.command.clone(),
            icon_path: self.icon_path.clone().filter(|icon| !icon.trim().is_empty()),
            target_type: self.target_type,
            menu_style: self.menu_style,
            enabled: self.enabled,
        }
    }
}

/// One skipped entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportIssue {
    /// Position in the document's `shortcuts` array.
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportIssue>,
}

/// Serializes a document as pretty JSON.
pub fn to_json(document: &InterchangeDocument) -> Result<String, FormatError> {
    serde_json::to_string_pretty(document).map_err(|err| FormatError::Malformed(err.to_string()))
}

/// Parses a document, checking the version before the body shape.
pub fn from_json(text: &str) -> Result<InterchangeDocument, FormatError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|err| FormatError::Malformed(err.to_string()))?;

    let found = value
        .get("formatVersion")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| FormatError::Malformed("missing or invalid `formatVersion`".to_string()))?;
    check_version(found)?;

    serde_json::from_value(value).map_err(|err| FormatError::Malformed(err.to_string()))
}

fn check_version(found: u64) -> Result<(), FormatError> {
    if found == 0 || found > u64::from(FORMAT_VERSION) {
        return Err(FormatError::UnsupportedVersion {
            found,
            supported: FORMAT_VERSION,
        });
    }
    Ok(())
}

/// `(enabled, target, lowercased name)`.
type NameKey = (bool, TargetType, String);

/// Import/export over a shortcut store.
pub struct ImportExport<'a, S: ShortcutStore, A: AuditSink> {
    store: &'a S,
    audit: &'a A,
    max_entries: usize,
    gate: MutationGate,
}

impl<'a, S: ShortcutStore, A: AuditSink> ImportExport<'a, S, A> {
    pub fn new(store: &'a S, audit: &'a A) -> Self {
        Self {
            store,
            audit,
            max_entries: DEFAULT_MAX_IMPORT_COUNT,
            gate: MutationGate::new(),
        }
    }

    pub fn with_gate(mut self, gate: MutationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Exports every entry in creation order.
    pub fn export_all(&self) -> Result<InterchangeDocument, ManagerError> {
        let entries = match self.store.list(&ShortcutFilter::all()) {
            Ok(entries) => entries,
            Err(err) => {
                self.record(AuditRecord::failure(
                    AuditOperation::Export,
                    None,
                    err.to_string(),
                ));
                return Err(err.into());
            }
        };

        let document =
            InterchangeDocument::new(entries.iter().map(InterchangeRecord::from).collect());
        info!(
            "event=catalog_export module=interchange status=ok entries={}",
            document.shortcuts.len()
        );
        self.record(AuditRecord::success(
            AuditOperation::Export,
            None,
            format!("exported {} entries", document.shortcuts.len()),
        ));
        Ok(document)
    }

    /// Imports every acceptable entry of `document`.
    ///
    /// An enabled entry is skipped when it fails validation or when an
    /// enabled entry with the same name (case-insensitive) and target already
    /// exists. Disabled entries are only checked against disabled ones, so a
    /// disabled copy next to its enabled twin survives a round trip.
    pub fn import_document(
        &self,
        document: &InterchangeDocument,
    ) -> Result<ImportReport, ManagerError> {
        let Some(_guard) = self.gate.try_enter() else {
            self.record(AuditRecord::failure(
                AuditOperation::Import,
                None,
                ManagerError::Busy.to_string(),
            ));
            return Err(ManagerError::Busy);
        };
        if let Err(err) = self.check_document(document) {
            self.record(AuditRecord::failure(
                AuditOperation::Import,
                None,
                err.to_string(),
            ));
            return Err(err.into());
        }

        let mut known: HashSet<NameKey> = self
            .store
            .list(&ShortcutFilter::all())?
            .into_iter()
            .map(|entry| (entry.enabled, entry.target_type, entry.name.to_lowercase()))
            .collect();

        let mut report = ImportReport::default();
        for (index, record) in document.shortcuts.iter().enumerate() {
            let key = (record.enabled, record.target_type, record.name.to_lowercase());
            if known.contains(&key) {
                report.skip(index, record, "duplicate of an existing shortcut");
                continue;
            }

            match self.store.create(&record.to_draft()) {
                Ok(_) => {
                    known.insert(key);
                    report.imported += 1;
                }
                Err(StoreError::Validation(reason)) | Err(StoreError::Conflict(reason)) => {
                    report.skip(index, record, reason);
                }
                Err(err) => {
                    error!(
                        "event=catalog_import module=interchange status=error index={index} imported={} error={err}",
                        report.imported
                    );
                    self.record(AuditRecord::failure(
                        AuditOperation::Import,
                        None,
                        format!("aborted at entry {index} after {} imported: {err}", report.imported),
                    ));
                    return Err(err.into());
                }
            }
        }

        info!(
            "event=catalog_import module=interchange status=ok imported={} skipped={}",
            report.imported, report.skipped
        );
        self.record(AuditRecord::success(
            AuditOperation::Import,
            None,
            format!("imported {}, skipped {}", report.imported, report.skipped),
        ));
        Ok(report)
    }

    /// Parses and imports JSON text.
    pub fn import_json(&self, text: &str) -> Result<ImportReport, ManagerError> {
        let document = match from_json(text) {
            Ok(document) => document,
            Err(err) => {
                self.record(AuditRecord::failure(
                    AuditOperation::Import,
                    None,
                    err.to_string(),
                ));
                return Err(err.into());
            }
        };
        self.import_document(&document)
    }

    fn check_document(&self, document: &InterchangeDocument) -> Result<(), FormatError> {
        check_version(u64::from(document.format_version))?;
        if document.shortcuts.len() > self.max_entries {
            return Err(FormatError::TooManyEntries {
                count: document.shortcuts.len(),
                max: self.max_entries,
            });
        }
        Ok(())
    }

    fn record(&self, record: AuditRecord) {
        if let Err(err) = self.audit.append(&record) {
            error!(
                "event=audit_append module=interchange status=error operation={} error={err}",
                record.operation.as_str()
            );
        }
    }
}

impl ImportReport {
    fn skip(&mut self, index: usize, record: &InterchangeRecord, reason: impl Into<String>) {
        self.skipped += 1;
        self.errors.push(ImportIssue {
            index,
            name: record.name.clone(),
            reason: reason.into(),
        });
    }
}
