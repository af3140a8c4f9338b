//! Command security validation.
//!
//! # Responsibility
//! - Judge candidate commands, names and icon paths safe-to-register.
//! - Keep rule data (denylist, reserved names) separate from control flow.
//!
//! # Invariants
//! - Validation never fails for string input; rejection is a `Verdict`.
//! - The only side effect is the injected `PathProbe` lookup.

pub mod probe;
pub mod rules;
mod validator;

pub use probe::{FsProbe, PathProbe};
pub use validator::{SecurityValidator, ValidationCheck, ValidatorError, Verdict};
