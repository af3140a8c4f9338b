//! In-process registry adapter.
//!
//! Backs CLI previews and tests. Supports scripted failures so rollback
//! paths can be exercised without touching a real hive.

use super::{AdapterError, AdapterErrorKind, AdapterResult, RegistryAdapter, RegistryPath};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Write,
    Delete,
}

#[derive(Debug, Clone)]
struct FailureRule {
    on: FailOn,
    fragment: String,
    kind: AdapterErrorKind,
}

#[derive(Debug, Clone)]
struct MemoryKey {
    path: RegistryPath,
    // lowercased name -> (original name, value)
    values: BTreeMap<String, (String, String)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    keys: BTreeMap<String, MemoryKey>,
    failures: Vec<FailureRule>,
    writes: usize,
    deletes: usize,
}

/// Thread-safe map-backed registry.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<MemoryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later write or delete whose path contains `fragment`
    /// (case-insensitive) fail with `kind`.
    pub fn fail_when(&self, on: FailOn, fragment: &str, kind: AdapterErrorKind) {
        self.lock().failures.push(FailureRule {
            on,
            fragment: fragment.to_lowercase(),
            kind,
        });
    }

    /// Shorthand for an access-denied write failure.
    pub fn fail_writes_matching(&self, fragment: &str) {
        self.fail_when(FailOn::Write, fragment, AdapterErrorKind::AccessDenied);
    }

    pub fn fail_deletes_matching(&self, fragment: &str) {
        self.fail_when(FailOn::Delete, fragment, AdapterErrorKind::AccessDenied);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Number of successful value writes so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn delete_count(&self) -> usize {
        self.lock().deletes
    }

    /// All key paths, sorted case-insensitively.
    pub fn key_paths(&self) -> Vec<RegistryPath> {
        self.lock()
            .keys
            .values()
            .map(|key| key.path.clone())
            .collect()
    }

    /// Reads one value without going through the adapter contract.
    pub fn value(&self, path: &RegistryPath, name: &str) -> Option<String> {
        self.lock()
            .keys
            .get(&path.normalized())
            .and_then(|key| key.values.get(&name.to_lowercase()))
            .map(|(_, value)| value.clone())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn check_failure(&self, on: FailOn, path: &RegistryPath) -> AdapterResult<()> {
        let normalized = path.normalized();
        match self
            .failures
            .iter()
            .find(|rule| rule.on == on && normalized.contains(&rule.fragment))
        {
            Some(rule) => Err(AdapterError::new(
                rule.kind,
                path,
                "injected failure",
            )),
            None => Ok(()),
        }
    }

    fn ensure_key(&mut self, path: &RegistryPath) {
        let mut current: Option<RegistryPath> = None;
        for segment in path.as_str().split('\\') {
            let next = match &current {
                Some(parent) => parent.join(segment),
                None => RegistryPath::new(segment),
            };
            self.keys
                .entry(next.normalized())
                .or_insert_with(|| MemoryKey {
                    path: next.clone(),
                    values: BTreeMap::new(),
                });
            current = Some(next);
        }
    }
}

impl RegistryAdapter for MemoryRegistry {
    fn write_key(&self, path: &RegistryPath, name: &str, value: &str) -> AdapterResult<()> {
        let mut state = self.lock();
        state.check_failure(FailOn::Write, path)?;
        state.ensure_key(path);
        if let Some(key) = state.keys.get_mut(&path.normalized()) {
            key.values
                .insert(name.to_lowercase(), (name.to_string(), value.to_string()));
        }
        state.writes += 1;
        Ok(())
    }

    fn create_key(&self, path: &RegistryPath) -> AdapterResult<()> {
        let mut state = self.lock();
        state.check_failure(FailOn::Write, path)?;
        state.ensure_key(path);
        Ok(())
    }

    fn delete_key(&self, path: &RegistryPath) -> AdapterResult<()> {
        let mut state = self.lock();
        state.check_failure(FailOn::Delete, path)?;
        if !state.keys.contains_key(&path.normalized()) {
            return Err(AdapterError::not_found(path));
        }
        state.keys.retain(|_, key| !key.path.is_within(path));
        state.deletes += 1;
        Ok(())
    }

    fn key_exists(&self, path: &RegistryPath) -> AdapterResult<bool> {
        Ok(self.lock().keys.contains_key(&path.normalized()))
    }

    fn list_subkeys(&self, path: &RegistryPath) -> AdapterResult<Vec<String>> {
        let state = self.lock();
        if !state.keys.contains_key(&path.normalized()) {
            return Err(AdapterError::not_found(path));
        }
        let prefix = format!("{}\\", path.normalized());
        Ok(state
            .keys
            .iter()
            .filter(|(normalized, _)| {
                normalized
                    .strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('\\'))
            })
            .map(|(_, key)| key.path.leaf().to_string())
            .collect())
    }

    fn read_values(&self, path: &RegistryPath) -> AdapterResult<Vec<(String, String)>> {
        let state = self.lock();
        let key = state
            .keys
            .get(&path.normalized())
            .ok_or_else(|| AdapterError::not_found(path))?;
        Ok(key.values.values().cloned().collect())
    }
}
