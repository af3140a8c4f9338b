//! Single-slot background runner for long batch jobs.
//!
//! # Responsibility
//! - Run one job at a time on a named thread so callers stay responsive.
//! - Fail fast with `ManagerError::Busy` while a job is in flight.
//!
//! # Invariants
//! - The worker's busy slot is a `MutationGate`; managers built with the
//!   same gate reject mutations with `Busy` while a job holds it.
//! - The slot is released when the job finishes, panics or is canceled.
//! - A job can only be canceled before it starts; once running it runs to
//!   completion.

use crate::capability::MenuCapabilities;
use crate::db::open_db;
use crate::model::shortcut::ShortcutId;
use crate::registry::RegistryAdapter;
use crate::repo::audit_repo::SqliteAuditLog;
use crate::repo::shortcut_repo::{SqliteShortcutStore, StoreError};
use crate::security::SecurityValidator;
use crate::service::gate::MutationGate;
use crate::service::menu_manager::{BatchReport, ManagerError, MenuManager};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const WORKER_THREAD_NAME: &str = "ctxmenu-batch";

const JOB_QUEUED: u8 = 0;
const JOB_RUNNING: u8 = 1;
const JOB_CANCELED: u8 = 2;

/// Why a job produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    Canceled,
    Panicked(String),
}

impl Display for JobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Canceled => write!(f, "batch job was canceled before it started"),
            Self::Panicked(message) => write!(f, "batch job panicked: {message}"),
        }
    }
}

impl Error for JobError {}

/// Runs at most one job at a time.
#[derive(Debug, Default)]
pub struct BatchWorker {
    gate: MutationGate,
    start_delay: Duration,
}

impl BatchWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `gate` as the busy slot, shared with foreground managers.
    pub fn with_gate(mut self, gate: MutationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &MutationGate {
        &self.gate
    }

    /// Holds each job for `delay` before it starts; it can be canceled
    /// during that window.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_held()
    }

    /// Starts `job` on the worker thread, or fails with `Busy`.
    pub fn try_submit<T, F>(&self, job: F) -> Result<BatchHandle<T>, ManagerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let Some(guard) = self.gate.try_enter() else {
            info!("event=batch_submit module=worker status=busy");
            return Err(ManagerError::Busy);
        };

        let state = Arc::new(AtomicU8::new(JOB_QUEUED));
        let thread_state = Arc::clone(&state);
        let delay = self.start_delay;

        let join = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let _guard = guard;
                wait_for_start(&thread_state, delay);
                if thread_state
                    .compare_exchange(JOB_QUEUED, JOB_RUNNING, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    info!("event=batch_job module=worker status=canceled");
                    return None;
                }

                let started_at = Instant::now();
                let value = job();
                info!(
                    "event=batch_job module=worker status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Some(value)
            })
            .map_err(|err| {
                error!("event=batch_submit module=worker status=error error={err}");
                ManagerError::Spawn(err)
            })?;

        Ok(BatchHandle { join, state })
    }
}

fn wait_for_start(state: &AtomicU8, delay: Duration) {
    let deadline = Instant::now() + delay;
    while state.load(Ordering::Acquire) == JOB_QUEUED {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::park_timeout(deadline - now);
    }
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct BatchHandle<T> {
    join: JoinHandle<Option<T>>,
    state: Arc<AtomicU8>,
}

impl<T> BatchHandle<T> {
    /// Cancels the job if it has not started. Returns whether it took effect.
    pub fn cancel(&self) -> bool {
        let canceled = self
            .state
            .compare_exchange(JOB_QUEUED, JOB_CANCELED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if canceled {
            self.join.thread().unpark();
        }
        canceled
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the job and returns its value.
    pub fn join(self) -> Result<T, JobError> {
        match self.join.join() {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(JobError::Canceled),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|text| (*text).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                Err(JobError::Panicked(message))
            }
        }
    }
}

/// Inputs for a background `apply_batch` against a catalog file.
pub struct BatchApplyJob<R, C> {
    pub db_path: PathBuf,
    pub registry: R,
    pub capabilities: C,
    pub validator: SecurityValidator,
    pub ids: Vec<ShortcutId>,
}

/// Submits `apply_batch` on the worker thread.
///
/// The job opens its own connection and runs under the worker's gate, so
/// foreground managers sharing that gate get `Busy` until it finishes.
pub fn submit_apply_batch<R, C>(
    worker: &BatchWorker,
    job: BatchApplyJob<R, C>,
) -> Result<BatchHandle<Result<BatchReport, ManagerError>>, ManagerError>
where
    R: RegistryAdapter + Send + 'static,
    C: MenuCapabilities + Send + 'static,
{
    worker.try_submit(move || {
        let conn = open_db(&job.db_path).map_err(StoreError::from)?;
        let store = SqliteShortcutStore::new(&conn, job.validator.clone());
        let audit = SqliteAuditLog::new(&conn);
        let mut manager = MenuManager::new(
            store,
            audit,
            job.registry,
            job.capabilities,
            job.validator,
        );
        manager.apply_batch(&job.ids)
    })
}
