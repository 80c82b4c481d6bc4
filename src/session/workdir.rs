//! Injected working-directory override.
//!
//! While a session is active, tool implementations resolve file operations
//! against the session worktree instead of the primary checkout. The
//! override is an explicit collaborator owned by the host application and
//! shared with the session manager — never a process global.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Shared, settable working-directory override.
#[derive(Debug, Default)]
pub struct WorkingDirOverride {
    inner: RwLock<Option<PathBuf>>,
}

impl WorkingDirOverride {
    /// Create an empty override.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect subsequent file operations into `path`.
    pub fn set(&self, path: PathBuf) {
        *self.write_guard() = Some(path);
    }

    /// Remove the redirection.
    pub fn clear(&self) {
        *self.write_guard() = None;
    }

    /// The current override, if any.
    #[must_use]
    pub fn get(&self) -> Option<PathBuf> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The effective working directory: the override when set, otherwise
    /// `default`.
    #[must_use]
    pub fn resolve(&self, default: &Path) -> PathBuf {
        self.get().unwrap_or_else(|| default.to_path_buf())
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Option<PathBuf>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
