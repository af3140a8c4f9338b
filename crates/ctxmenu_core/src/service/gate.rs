//! Process-wide serialization point for catalog and registry mutations.
//!
//! # Invariants
//! - At most one `GateGuard` exists per gate at any time.
//! - Entering never blocks; a held gate is reported as `None`.
//! - The guard is `Send`, so a worker thread can own it for a whole job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle; clones share one slot.
#[derive(Debug, Clone, Default)]
pub struct MutationGate {
    held: Arc<AtomicBool>,
}

impl MutationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot, or returns `None` while another holder has it.
    pub fn try_enter(&self) -> Option<GateGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the slot on drop, including during unwinding.
#[derive(Debug)]
pub struct GateGuard {
    held: Arc<AtomicBool>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
