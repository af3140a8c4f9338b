//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate store, audit sink and registry adapter into lifecycle
//!   operations (`menu_manager`).
//! - Import and export catalogs (`interchange`).
//! - Run long batches off the caller's thread (`batch_worker`).
//! - Serialize mutations across managers and the worker (`gate`).

pub mod batch_worker;
pub mod gate;
pub mod interchange;
pub mod menu_manager;
