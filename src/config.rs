//! Global configuration parsing, validation, and default storage paths.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// Shadow checkpoint store configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct CheckpointOptions {
    /// Whether workspace checkpointing is enabled.
    pub enabled: bool,
    /// Root directory holding one shadow mirror per workspace.
    pub checkpoint_directory: PathBuf,
    /// Retention bound — metadata records kept per workspace.
    pub max_checkpoints: usize,
    /// Whether pruning runs automatically after each checkpoint creation.
    pub auto_prune: bool,
}

impl Default for CheckpointOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            checkpoint_directory: default_checkpoint_directory(),
            max_checkpoints: default_max_checkpoints(),
            auto_prune: true,
        }
    }
}

/// Git session isolation configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GitSessionOptions {
    /// Whether branch/worktree session isolation is enabled.
    pub enabled: bool,
    /// Whether the interceptor lazily starts a session on the first
    /// mutating tool call.
    pub auto_start_session: bool,
    /// Prefix for generated session branch names.
    pub branch_prefix: String,
    /// Directory under which session worktrees are created.
    pub worktree_base_path: PathBuf,
    /// Idle minutes before a session times out.
    pub session_timeout_minutes: u64,
    /// Whether a timed-out session's worktree and branch are discarded.
    pub auto_revert_on_timeout: bool,
    /// Whether startup scans for sessions orphaned by a prior crash.
    pub cleanup_orphaned_sessions_on_startup: bool,
    /// Whether failed or timed-out session branches are retained for
    /// post-mortem inspection instead of deleted.
    pub keep_failed_session_branches: bool,
    /// Directory holding the durable session state record per workspace.
    pub state_store_path: PathBuf,
}

impl Default for GitSessionOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_start_session: true,
            branch_prefix: default_branch_prefix(),
            worktree_base_path: env::temp_dir(),
            session_timeout_minutes: default_session_timeout_minutes(),
            auto_revert_on_timeout: true,
            cleanup_orphaned_sessions_on_startup: true,
            keep_failed_session_branches: false,
            state_store_path: default_state_store_path(),
        }
    }
}

fn default_branch_prefix() -> String {
    "ai/session".into()
}

fn default_session_timeout_minutes() -> u64 {
    30
}

fn default_max_checkpoints() -> usize {
    100
}

/// `~/.codepunk` storage root, falling back to the current directory when
/// no home directory can be determined (e.g., stripped-down containers).
fn codepunk_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codepunk")
}

fn default_checkpoint_directory() -> PathBuf {
    codepunk_home().join("checkpoints")
}

fn default_state_store_path() -> PathBuf {
    codepunk_home().join("git-sessions")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Shadow checkpoint store settings.
    pub checkpoint: CheckpointOptions,
    /// Git session isolation settings.
    pub git_session: GitSessionOptions,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.checkpoint.max_checkpoints == 0 {
            return Err(AppError::Config(
                "checkpoint.max_checkpoints must be greater than zero".into(),
            ));
        }

        if self.git_session.session_timeout_minutes == 0 {
            return Err(AppError::Config(
                "git_session.session_timeout_minutes must be greater than zero".into(),
            ));
        }

        let prefix = self.git_session.branch_prefix.trim();
        if prefix.is_empty() {
            return Err(AppError::Config(
                "git_session.branch_prefix must not be empty".into(),
            ));
        }
        if prefix.chars().any(char::is_whitespace) {
            return Err(AppError::Config(
                "git_session.branch_prefix must not contain whitespace".into(),
            ));
        }

        Ok(())
    }
}
