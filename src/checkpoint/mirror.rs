//! Workspace ⇄ mirror tree synchronization.
//!
//! Plain content copies rather than version-control diffs: simple,
//! O(workspace size) per checkpoint, and oblivious to whether the
//! workspace is itself a repository.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::{AppError, Result};

/// Directory names never mirrored in either direction: the workspace's own
/// version control, agent-internal state, and the conventional large
/// dependency/build trees that are useless for undo and grow without bound.
const SKIPPED_DIR_NAMES: &[&str] = &[
    ".git",
    ".codepunk",
    "node_modules",
    "target",
    ".venv",
    "venv",
    "dist",
    "build",
    "__pycache__",
    ".cache",
];

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIR_NAMES.contains(&name))
}

/// Collect the relative paths of all regular files under `root`, honoring
/// the skip list. Cancellable between directory entries.
fn collect_files(root: &Path, cancel: &CancellationToken) -> Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry));

    for entry in walker {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let entry = entry.map_err(|err| AppError::Io(format!("walk {}: {err}", root.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|err| AppError::Io(format!("strip prefix: {err}")))?
            .to_path_buf();
        files.insert(rel);
    }

    Ok(files)
}

fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| AppError::Io(format!("create {}: {err}", parent.display())))?;
    }
    fs::copy(source, dest).map_err(|err| {
        AppError::Io(format!(
            "copy {} -> {}: {err}",
            source.display(),
            dest.display()
        ))
    })?;
    Ok(())
}

/// Make the mirror tree an exact copy of the workspace tree.
///
/// Copies every regular file and deletes mirror entries that vanished from
/// the workspace, so the subsequent commit records deletions too. The skip
/// list protects the mirror's own `.git` on the destination side.
///
/// # Errors
///
/// Returns `AppError::Cancelled` if the token fires between file
/// operations, or `AppError::Io` on any filesystem failure.
pub(crate) fn mirror_into(
    workspace: &Path,
    mirror: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let sources = collect_files(workspace, cancel)?;
    let existing = collect_files(mirror, cancel)?;

    for rel in &sources {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        copy_file(&workspace.join(rel), &mirror.join(rel))?;
    }

    for stale in existing.difference(&sources) {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let path = mirror.join(stale);
        fs::remove_file(&path)
            .map_err(|err| AppError::Io(format!("remove {}: {err}", path.display())))?;
    }

    Ok(())
}

/// Copy the mirror tree over the workspace — overlay semantics.
///
/// Every file present in the mirror overwrites its workspace counterpart;
/// workspace files with no counterpart are left untouched.
///
/// # Errors
///
/// Returns `AppError::Cancelled` if the token fires between file
/// operations, or `AppError::Io` on any filesystem failure.
pub(crate) fn overlay_onto(
    mirror: &Path,
    workspace: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    for rel in collect_files(mirror, cancel)? {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        copy_file(&mirror.join(&rel), &workspace.join(&rel))?;
    }
    Ok(())
}
