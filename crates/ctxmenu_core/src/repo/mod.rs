//! Persistence contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define the shortcut store and audit sink contracts the manager uses.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Store writes run shape validation and the security validator before
//!   any SQL mutation.
//! - Store APIs return semantic errors (`NotFound`, `Conflict`) in addition
//!   to DB transport errors.
//! - The audit log is append-only; the schema rejects updates and deletes.
//! - Registry backups are insert-only and outlive the entry they belong to.

pub mod audit_repo;
pub mod backup_repo;
pub mod shortcut_repo;
