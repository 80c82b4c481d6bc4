//! Durable session state record.
//!
//! One JSON file per workspace under the configured state store directory,
//! written atomically. Survives process restarts so startup can detect and
//! clean up sessions orphaned by a crash.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::models::session::GitSession;
use crate::models::workspace_identity;
use crate::{AppError, Result};

/// Durable projection of the current (or most recently active) session.
#[derive(Debug, Clone)]
pub struct SessionStateStore {
    record_path: PathBuf,
}

impl SessionStateStore {
    /// Create a store rooted at `state_store_path` for one workspace.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the state directory cannot be created.
    pub fn new(state_store_path: &Path, workspace_root: &Path) -> Result<Self> {
        fs::create_dir_all(state_store_path)
            .map_err(|err| AppError::Io(format!("create state store dir: {err}")))?;
        let record_path =
            state_store_path.join(format!("{}.json", workspace_identity(workspace_root)));
        Ok(Self { record_path })
    }

    /// Path of the record file, for diagnostics.
    #[must_use]
    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Persist the session record atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Serialization` or `AppError::Io` on failure.
    pub fn save(&self, session: &GitSession) -> Result<()> {
        let body = serde_json::to_vec_pretty(session)?;
        let tmp = self.record_path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .map_err(|err| AppError::Io(format!("write {}: {err}", tmp.display())))?;
        fs::rename(&tmp, &self.record_path).map_err(|err| {
            AppError::Io(format!("rename {}: {err}", self.record_path.display()))
        })?;
        Ok(())
    }

    /// Load the persisted session record.
    ///
    /// An absent record yields `None`; an unreadable or corrupt record is
    /// warned about and treated as absent — a broken record must never
    /// block startup recovery.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; the `Result` keeps the contract
    /// uniform with [`save`](Self::save).
    pub fn load(&self) -> Result<Option<GitSession>> {
        let raw = match fs::read_to_string(&self.record_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                warn!(path = %self.record_path.display(), %err, "unreadable session record");
                return Ok(None);
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!(path = %self.record_path.display(), %err, "corrupt session record; ignoring");
                Ok(None)
            }
        }
    }

    /// Remove the persisted record, if present.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if deletion fails for a reason other than
    /// the record being absent.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.record_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Io(format!(
                "remove {}: {err}",
                self.record_path.display()
            ))),
        }
    }
}
