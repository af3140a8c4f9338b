//! Core domain logic for ctxmenu, a manager for shell context-menu shortcuts.
//!
//! Validates commands, keeps the catalog in SQLite, writes registry keys with
//! compensation on failure, and records every mutation in an audit log.

pub mod capability;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod registry;
pub mod repo;
pub mod security;
pub mod service;

pub use capability::{MenuCapabilities, StaticCapabilities};
pub use config::{AppConfig, ConfigError, ValidatorConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::audit::{AuditOperation, AuditOutcome, AuditRecord};
pub use model::shortcut::{
    AppliedState, MenuStyle, ShortcutDraft, ShortcutEntry, ShortcutId, ShortcutPatch,
    ShortcutValidationError, TargetType,
};
pub use registry::memory::MemoryRegistry;
pub use registry::{AdapterError, AdapterErrorKind, RegistryAdapter, RegistryPath};
pub use repo::audit_repo::{AuditSink, SqliteAuditLog};
pub use repo::backup_repo::RegistryBackup;
pub use repo::shortcut_repo::{
    ShortcutFilter, ShortcutStore, SqliteShortcutStore, StoreError, StoreResult,
};
pub use security::{SecurityValidator, ValidatorError, Verdict};
pub use service::batch_worker::{BatchHandle, BatchWorker, JobError};
pub use service::gate::{GateGuard, MutationGate};
pub use service::interchange::{
    FormatError, ImportExport, ImportReport, InterchangeDocument, InterchangeRecord,
};
pub use service::menu_manager::{
    ApplyReport, BatchFailure, BatchReport, DriftReport, ManagerError, MenuManager,
    RegistryPresence, RollbackOutcome,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
