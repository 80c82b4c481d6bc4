//! Checkpoint creation, restore, listing, and pruning over the shadow
//! mirror repository.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};

use crate::config::CheckpointOptions;
use crate::git::GitRunner;
use crate::models::checkpoint::Checkpoint;
use crate::models::workspace_identity;
use crate::{AppError, Result};

use super::mirror;

/// Fixed bot identity for mirror commits.
const BOT_NAME: &str = "codepunk";
const BOT_EMAIL: &str = "rollback@codepunk.local";

/// Resolved on-disk layout of one workspace's shadow mirror.
#[derive(Debug, Clone)]
struct MirrorLayout {
    workspace_root: PathBuf,
    mirror_dir: PathBuf,
    metadata_dir: PathBuf,
}

/// Shadow checkpoint store for one workspace.
///
/// Owns the hidden mirror repository and the metadata index exclusively;
/// no other component mutates checkpoint records.
pub struct CheckpointStore {
    options: CheckpointOptions,
    git: GitRunner,
    layout: Mutex<Option<MirrorLayout>>,
}

impl CheckpointStore {
    /// Create a store from configuration. No I/O happens until
    /// [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(options: CheckpointOptions) -> Self {
        Self {
            options,
            git: GitRunner::new(),
            layout: Mutex::new(None),
        }
    }

    /// Whether checkpointing is enabled in configuration.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    /// Prepare the shadow mirror for a workspace.
    ///
    /// Computes the mirror identity from the workspace path, creates the
    /// mirror and metadata directories, and turns the mirror into a git
    /// repository with a fixed bot identity — exactly once. Calling this
    /// again for the same workspace reuses the existing mirror.
    ///
    /// A disabled store logs and returns without initializing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directories cannot be created, or a
    /// git error if repository setup fails.
    pub async fn initialize(
        &self,
        workspace_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !self.options.enabled {
            debug!("checkpointing disabled; skipping mirror initialization");
            return Ok(());
        }

        let workspace_root = workspace_path
            .canonicalize()
            .map_err(|err| AppError::Io(format!("workspace path invalid: {err}")))?;
        let identity = workspace_identity(&workspace_root);

        let span = info_span!("initialize_checkpoints", workspace = %identity);
        let _guard = span.enter();

        let root = self.options.checkpoint_directory.join(&identity);
        let mirror_dir = root.join("mirror");
        let metadata_dir = root.join("metadata");
        fs::create_dir_all(&mirror_dir)
            .map_err(|err| AppError::Io(format!("create mirror dir: {err}")))?;
        fs::create_dir_all(&metadata_dir)
            .map_err(|err| AppError::Io(format!("create metadata dir: {err}")))?;

        if mirror_dir.join(".git").exists() {
            debug!("mirror already initialized");
        } else {
            self.git
                .exec_checked(&["init"], &mirror_dir, cancel)
                .await?;
            self.git
                .exec_checked(&["config", "user.name", BOT_NAME], &mirror_dir, cancel)
                .await?;
            self.git
                .exec_checked(&["config", "user.email", BOT_EMAIL], &mirror_dir, cancel)
                .await?;
            info!(mirror = %mirror_dir.display(), "shadow mirror created");
        }

        self.set_layout(MirrorLayout {
            workspace_root,
            mirror_dir,
            metadata_dir,
        });
        Ok(())
    }

    /// Snapshot the workspace into the mirror and record a checkpoint.
    ///
    /// The commit allows an empty tree change, so a checkpoint exists for
    /// every tool call even when nothing changed. Metadata is written only
    /// after the commit succeeds — an aborted creation never corrupts the
    /// index.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotInitialized` before [`initialize`](Self::initialize),
    /// `AppError::Cancelled` when aborted, or git/io errors from the
    /// underlying operations.
    pub async fn create_checkpoint(
        &self,
        tool_call_id: &str,
        tool_name: &str,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<Checkpoint> {
        let layout = self.layout()?;
        let mut checkpoint = Checkpoint::new(
            tool_call_id.to_owned(),
            tool_name.to_owned(),
            description.to_owned(),
        );

        let span = info_span!("create_checkpoint", checkpoint_id = %checkpoint.id, tool = tool_name);
        let _guard = span.enter();

        mirror::mirror_into(&layout.workspace_root, &layout.mirror_dir, cancel)?;

        self.git
            .exec_checked(&["add", "-A"], &layout.mirror_dir, cancel)
            .await?;
        let message = format!("Checkpoint {}: {}", checkpoint.id, description);
        self.git
            .exec_checked(
                &["commit", "--allow-empty", "-m", &message],
                &layout.mirror_dir,
                cancel,
            )
            .await?;

        let head = self
            .git
            .exec_checked(&["rev-parse", "HEAD"], &layout.mirror_dir, cancel)
            .await?;
        checkpoint.commit_hash = head.trimmed_stdout();
        checkpoint.modified_files = self.committed_paths(&layout, cancel).await?;

        write_metadata(&layout.metadata_dir, &checkpoint)?;

        info!(
            commit = %checkpoint.commit_hash,
            files = checkpoint.modified_files.len(),
            "checkpoint created"
        );

        if self.options.auto_prune {
            self.prune_checkpoints(self.options.max_checkpoints).await?;
        }

        Ok(checkpoint)
    }

    /// Restore the workspace to a prior checkpoint.
    ///
    /// Checks the snapshot's tree out inside the mirror, then copies it
    /// over the workspace. Restore is an overlay: files created after the
    /// checkpoint are left in place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id,
    /// `AppError::Serialization` for corrupt metadata, plus git/io/cancel
    /// errors from the underlying operations.
    pub async fn restore_checkpoint(
        &self,
        checkpoint_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Checkpoint> {
        let layout = self.layout()?;
        let checkpoint = self.get_checkpoint(checkpoint_id)?;

        let span = info_span!("restore_checkpoint", checkpoint_id, commit = %checkpoint.commit_hash);
        let _guard = span.enter();

        // read-tree + checkout-index moves the mirror work tree to the
        // snapshot without touching HEAD, so later checkpoints keep
        // committing onto the same history.
        self.git
            .exec_checked(&["read-tree", &checkpoint.commit_hash], &layout.mirror_dir, cancel)
            .await?;
        self.git
            .exec_checked(&["checkout-index", "-a", "-f"], &layout.mirror_dir, cancel)
            .await?;

        mirror::overlay_onto(&layout.mirror_dir, &layout.workspace_root, cancel)?;

        info!("workspace restored to checkpoint");
        Ok(checkpoint)
    }

    /// List the most recent checkpoints, newest first.
    ///
    /// Corrupt metadata records are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotInitialized` before [`initialize`](Self::initialize),
    /// or `AppError::Io` if the metadata directory cannot be read.
    pub fn list_checkpoints(&self, limit: usize) -> Result<Vec<Checkpoint>> {
        let mut checkpoints = self.read_all_metadata()?;
        checkpoints.truncate(limit);
        Ok(checkpoints)
    }

    /// Fetch one checkpoint by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown or malformed id, and —
    /// unlike listing — reports corrupt metadata as
    /// `AppError::Serialization` instead of skipping it.
    pub fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Checkpoint> {
        let layout = self.layout()?;
        if !is_safe_id(checkpoint_id) {
            return Err(AppError::NotFound(format!(
                "checkpoint {checkpoint_id} not found"
            )));
        }

        let path = layout.metadata_dir.join(format!("{checkpoint_id}.json"));
        if !path.is_file() {
            return Err(AppError::NotFound(format!(
                "checkpoint {checkpoint_id} not found"
            )));
        }
        let raw = fs::read_to_string(&path)
            .map_err(|err| AppError::Io(format!("read {}: {err}", path.display())))?;
        serde_json::from_str(&raw).map_err(|err| {
            AppError::Serialization(format!("checkpoint {checkpoint_id} metadata corrupt: {err}"))
        })
    }

    /// Delete metadata records beyond the `keep` most recent, oldest
    /// first. The mirror commits stay in history, merely unreferenced by
    /// the index.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotInitialized` before [`initialize`](Self::initialize),
    /// or `AppError::Io` if a record cannot be deleted.
    pub async fn prune_checkpoints(&self, keep: usize) -> Result<usize> {
        let layout = self.layout()?;
        let checkpoints = self.read_all_metadata()?;
        if checkpoints.len() <= keep {
            return Ok(0);
        }

        let stale = &checkpoints[keep..];
        for checkpoint in stale {
            let path = layout.metadata_dir.join(format!("{}.json", checkpoint.id));
            fs::remove_file(&path)
                .map_err(|err| AppError::Io(format!("prune {}: {err}", path.display())))?;
        }
        info!(removed = stale.len(), keep, "pruned checkpoints");
        Ok(stale.len())
    }

    /// All metadata records, newest first.
    fn read_all_metadata(&self) -> Result<Vec<Checkpoint>> {
        let layout = self.layout()?;
        let entries = fs::read_dir(&layout.metadata_dir)
            .map_err(|err| AppError::Io(format!("read metadata dir: {err}")))?;

        let mut checkpoints = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %path.display(), %err, "unreadable checkpoint metadata; skipping");
                    continue;
                }
            };
            match serde_json::from_str::<Checkpoint>(&raw) {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(err) => {
                    warn!(path = %path.display(), %err, "corrupt checkpoint metadata; skipping");
                }
            }
        }

        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(checkpoints)
    }

    /// Paths touched by the HEAD commit, sorted and deduplicated.
    async fn committed_paths(
        &self,
        layout: &MirrorLayout,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let output = self
            .git
            .exec_checked(
                &["show", "--name-only", "--format=", "HEAD"],
                &layout.mirror_dir,
                cancel,
            )
            .await?;
        let mut paths: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn set_layout(&self, layout: MirrorLayout) {
        let mut guard = match self.layout.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(layout);
    }

    fn layout(&self) -> Result<MirrorLayout> {
        let guard = match self.layout.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone().ok_or_else(|| {
            AppError::NotInitialized("checkpoint store has not been initialized".into())
        })
    }
}

/// Reject ids that could escape the metadata directory.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Write a metadata record atomically: temp file in the same directory,
/// then rename over the final name.
fn write_metadata(metadata_dir: &Path, checkpoint: &Checkpoint) -> Result<()> {
    let body = serde_json::to_vec_pretty(checkpoint)?;
    let tmp = metadata_dir.join(format!(".{}.json.tmp", checkpoint.id));
    let path = metadata_dir.join(format!("{}.json", checkpoint.id));
    fs::write(&tmp, body).map_err(|err| AppError::Io(format!("write {}: {err}", tmp.display())))?;
    fs::rename(&tmp, &path)
        .map_err(|err| AppError::Io(format!("rename {}: {err}", path.display())))?;
    Ok(())
}
