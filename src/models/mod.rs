//! Domain models persisted by the checkpoint store and session manager.

use std::path::Path;

use sha2::{Digest, Sha256};

pub mod checkpoint;
pub mod session;

/// Derive the stable identity of a workspace from its absolute path.
///
/// SHA-256 of the canonical path, truncated to 16 hex characters. Repeated
/// runs against the same workspace land on the same shadow mirror and
/// session state record; distinct workspaces never collide in practice.
#[must_use]
pub fn workspace_identity(path: &Path) -> String {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    format!("{digest:x}").chars().take(16).collect()
}
