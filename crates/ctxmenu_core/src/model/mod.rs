//! Domain model for context-menu shortcuts and their audit trail.
//!
//! # Responsibility
//! - Define canonical data structures used by store, manager and interchange.
//!
//! # Invariants
//! - Every shortcut is identified by a stable `ShortcutId`.
//! - Registry sync status (`AppliedState`) is tracked separately from
//!   persistence and only advanced by the menu manager.

pub mod audit;
pub mod shortcut;
