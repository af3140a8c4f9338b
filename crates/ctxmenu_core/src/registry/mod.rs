//! Registry adapter contract and key layout.
//!
//! # Responsibility
//! - Define the narrow contract the menu manager uses to touch the OS
//!   configuration store (`RegistryAdapter`).
//! - Compute where each shortcut lives and in which order its keys are
//!   written (`layout`).
//! - Provide an in-process adapter for previews and tests (`memory`).
//!
//! # Invariants
//! - Key paths are case-insensitive and `\`-separated.
//! - `delete_key` removes the whole subtree; a missing key is reported as
//!   `AdapterErrorKind::NotFound`, never silently ignored by the adapter.

pub mod layout;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Backslash-separated registry key path relative to the user hive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryPath(String);

impl RegistryPath {
    pub fn new(path: impl Into<String>) -> Self {
        let raw: String = path.into();
        Self(raw.trim_matches('\\').to_string())
    }

    /// Appends one child segment.
    pub fn join(&self, segment: &str) -> Self {
        Self(format!("{}\\{}", self.0, segment.trim_matches('\\')))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment.
    pub fn leaf(&self) -> &str {
        self.0.rsplit('\\').next().unwrap_or(&self.0)
    }

    /// Lowercased form used for case-insensitive comparison.
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }

    /// Whether `self` is `other` or lies beneath it.
    pub fn is_within(&self, other: &RegistryPath) -> bool {
        let own = self.normalized();
        let parent = other.normalized();
        own == parent || own.starts_with(&format!("{parent}\\"))
    }
}

impl Display for RegistryPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    NotFound,
    AccessDenied,
    Io,
}

/// Registry I/O failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub path: RegistryPath,
    pub message: String,
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind, path: &RegistryPath, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.clone(),
            message: message.into(),
        }
    }

    pub fn not_found(path: &RegistryPath) -> Self {
        Self::new(AdapterErrorKind::NotFound, path, "key not found")
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == AdapterErrorKind::NotFound
    }
}

impl Display for AdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            AdapterErrorKind::NotFound => "not found",
            AdapterErrorKind::AccessDenied => "access denied",
            AdapterErrorKind::Io => "i/o failure",
        };
        write!(f, "registry {kind} at `{}`: {}", self.path, self.message)
    }
}

impl Error for AdapterError {}

/// Recursive copy of one key, used to restore pre-batch state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySnapshot {
    pub path: RegistryPath,
    pub exists: bool,
    pub values: Vec<(String, String)>,
    pub subkeys: Vec<KeySnapshot>,
}

impl KeySnapshot {
    pub fn absent(path: &RegistryPath) -> Self {
        Self {
            path: path.clone(),
            exists: false,
            values: Vec::new(),
            subkeys: Vec::new(),
        }
    }
}

/// Narrow contract over the OS configuration store.
///
/// Implementations are injected; the manager never assumes transactions.
pub trait RegistryAdapter {
    /// Sets `name` (empty for the default value) under `path`, creating the
    /// key and its parents when missing.
    fn write_key(&self, path: &RegistryPath, name: &str, value: &str) -> AdapterResult<()>;
    /// Creates `path` and its parents without setting any value.
    fn create_key(&self, path: &RegistryPath) -> AdapterResult<()>;
    /// Deletes `path` and its whole subtree.
    fn delete_key(&self, path: &RegistryPath) -> AdapterResult<()>;
    fn key_exists(&self, path: &RegistryPath) -> AdapterResult<bool>;
    /// Direct child key names.
    fn list_subkeys(&self, path: &RegistryPath) -> AdapterResult<Vec<String>>;
    /// All `(name, value)` pairs of one key.
    fn read_values(&self, path: &RegistryPath) -> AdapterResult<Vec<(String, String)>>;

    fn read_value(&self, path: &RegistryPath, name: &str) -> AdapterResult<Option<String>> {
        if !self.key_exists(path)? {
            return Ok(None);
        }
        Ok(self
            .read_values(path)?
            .into_iter()
            .find(|(value_name, _)| value_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value))
    }

    /// Captures `path` and its subtree. A missing key yields an absent snapshot.
    fn snapshot(&self, path: &RegistryPath) -> AdapterResult<KeySnapshot> {
        if !self.key_exists(path)? {
            return Ok(KeySnapshot::absent(path));
        }
        let mut subkeys = Vec::new();
        for child in self.list_subkeys(path)? {
            subkeys.push(self.snapshot(&path.join(&child))?);
        }
        Ok(KeySnapshot {
            path: path.clone(),
            exists: true,
            values: self.read_values(path)?,
            subkeys,
        })
    }

    /// Makes the subtree at the snapshot's path equal to the snapshot.
    fn restore_snapshot(&self, snapshot: &KeySnapshot) -> AdapterResult<()> {
        let path = &snapshot.path;
        if self.key_exists(path)? {
            match self.delete_key(path) {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        if snapshot.exists {
            write_snapshot_values(self, snapshot)?;
        }
        Ok(())
    }
}

fn write_snapshot_values<A: RegistryAdapter + ?Sized>(
    adapter: &A,
    snapshot: &KeySnapshot,
) -> AdapterResult<()> {
    let path = &snapshot.path;
    adapter.create_key(path)?;
    for (name, value) in &snapshot.values {
        adapter.write_key(path, name, value)?;
    }
    for child in snapshot.subkeys.iter().filter(|child| child.exists) {
        write_snapshot_values(adapter, child)?;
    }
    Ok(())
}

impl<T: RegistryAdapter + ?Sized> RegistryAdapter for &T {
    fn write_key(&self, path: &RegistryPath, name: &str, value: &str) -> AdapterResult<()> {
        (**self).write_key(path, name, value)
    }

    fn create_key(&self, path: &RegistryPath) -> AdapterResult<()> {
        (**self).create_key(path)
    }

    fn delete_key(&self, path: &RegistryPath) -> AdapterResult<()> {
        (**self).delete_key(path)
    }

    fn key_exists(&self, path: &RegistryPath) -> AdapterResult<bool> {
        (**self).key_exists(path)
    }

    fn list_subkeys(&self, path: &RegistryPath) -> AdapterResult<Vec<String>> {
        (**self).list_subkeys(path)
    }

    fn read_values(&self, path: &RegistryPath) -> AdapterResult<Vec<(String, String)>> {
        (**self).read_values(path)
    }
}

impl<T: RegistryAdapter + ?Sized> RegistryAdapter for Arc<T> {
    fn write_key(&self, path: &RegistryPath, name: &str, value: &str) -> AdapterResult<()> {
        (**self).write_key(path, name, value)
    }

    fn create_key(&self, path: &RegistryPath) -> AdapterResult<()> {
        (**self).create_key(path)
    }

    fn delete_key(&self, path: &RegistryPath) -> AdapterResult<()> {
        (**self).delete_key(path)
    }

    fn key_exists(&self, path: &RegistryPath) -> AdapterResult<bool> {
        (**self).key_exists(path)
    }

    fn list_subkeys(&self, path: &RegistryPath) -> AdapterResult<Vec<String>> {
        (**self).list_subkeys(path)
    }

    fn read_values(&self, path: &RegistryPath) -> AdapterResult<Vec<(String, String)>> {
        (**self).read_values(path)
    }
}

#[cfg(test)]
mod tests {
    use super::RegistryPath;

    #[test]
    fn join_and_leaf_use_backslashes() {
        let root = RegistryPath::new("Software\\Classes\\*\\shell\\");
        let key = root.join("Open with Code");
        assert_eq!(key.as_str(), "Software\\Classes\\*\\shell\\Open with Code");
        assert_eq!(key.leaf(), "Open with Code");
    }

    #[test]
    fn is_within_ignores_case_and_sibling_prefixes() {
        let parent = RegistryPath::new("Software\\Classes\\Directory\\shell\\Open");
        assert!(RegistryPath::new("software\\classes\\directory\\shell\\open\\command")
            .is_within(&parent));
        assert!(!RegistryPath::new("Software\\Classes\\Directory\\shell\\OpenMore")
            .is_within(&parent));
    }
}
