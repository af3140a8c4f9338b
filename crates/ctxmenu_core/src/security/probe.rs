//! File-system probe used by the validator's existence checks.

use std::fmt::Debug;
use std::path::Path;

/// Answers "does this file exist, and how large is it".
///
/// Implementations must not fail: an unreadable or missing path is `None`.
pub trait PathProbe: Debug + Send + Sync {
    fn file_len(&self, path: &Path) -> Option<u64>;

    fn exists(&self, path: &Path) -> bool {
        self.file_len(path).is_some()
    }
}

/// Probe backed by `std::fs::metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl PathProbe for FsProbe {
    fn file_len(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path)
            .ok()
            .filter(|metadata| metadata.is_file())
            .map(|metadata| metadata.len())
    }
}
