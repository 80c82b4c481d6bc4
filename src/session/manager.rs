//! Session lifecycle state machine over git branches and worktrees.
//!
//! One session isolates one agent working period: an ephemeral branch
//! checked out into a dedicated worktree, one commit per mutating tool
//! call, idle-timeout auto-revert, and explicit accept/discard. The
//! primary checkout is never touched until a session is accepted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::GitSessionOptions;
use crate::git::GitRunner;
use crate::models::session::{CommittedToolCall, GitSession, SessionState};
use crate::session::state_store::SessionStateStore;
use crate::session::workdir::WorkingDirOverride;
use crate::{AppError, Result};

/// How an explicitly ended session resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndAction {
    /// Fast-forward the primary checkout to the session branch, then
    /// delete the branch and worktree.
    Accept,
    /// Delete the branch and worktree without merging.
    Discard,
}

/// Owns the session state machine for one workspace.
///
/// At most one session is live at a time; the in-memory state field
/// enforces the invariant in-process and [`SessionStateStore`] holds the
/// durable projection used for orphan recovery across restarts.
pub struct SessionManager {
    options: GitSessionOptions,
    workspace_root: PathBuf,
    git: GitRunner,
    state_store: SessionStateStore,
    workdir: Arc<WorkingDirOverride>,
    current: Mutex<Option<GitSession>>,
}

impl SessionManager {
    /// Create a manager for one workspace.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the durable state directory cannot be
    /// created.
    pub fn new(
        options: GitSessionOptions,
        workspace_root: PathBuf,
        workdir: Arc<WorkingDirOverride>,
    ) -> Result<Self> {
        let state_store = SessionStateStore::new(&options.state_store_path, &workspace_root)?;
        Ok(Self {
            options,
            workspace_root,
            git: GitRunner::new(),
            state_store,
            workdir,
            current: Mutex::new(None),
        })
    }

    /// Whether session isolation is enabled in configuration.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    /// The configuration this manager runs under.
    #[must_use]
    pub fn options(&self) -> &GitSessionOptions {
        &self.options
    }

    /// The current (or most recently resolved) session, if any.
    pub async fn current_session(&self) -> Option<GitSession> {
        self.current.lock().await.clone()
    }

    /// Start a session, or return the live one.
    ///
    /// Idempotent lazy-start: a second call while a session is live
    /// returns the existing session. Otherwise verifies the workspace is
    /// a git repository, creates a fresh branch and worktree off the
    /// current `HEAD`, points the working-directory override at the
    /// worktree, and records the session durably.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` when isolation is disabled or the
    /// workspace is not a repository, plus git/io/cancel errors from the
    /// worktree setup.
    pub async fn begin_session(&self, cancel: &CancellationToken) -> Result<GitSession> {
        if !self.options.enabled {
            return Err(AppError::Session("git session isolation is disabled".into()));
        }

        let mut guard = self.current.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.state.is_live() {
                return Ok(session.clone());
            }
        }

        let span = info_span!("begin_session");
        let _span = span.enter();

        let probe = self
            .git
            .exec(
                &["rev-parse", "--is-inside-work-tree"],
                &self.workspace_root,
                cancel,
            )
            .await?;
        if !probe.success() || probe.trimmed_stdout() != "true" {
            return Err(AppError::Session(format!(
                "{} is not inside a git repository",
                self.workspace_root.display()
            )));
        }

        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let suffix: String = Uuid::new_v4().to_string().chars().take(8).collect();
        let branch_name = format!("{}/{stamp}-{suffix}", self.options.branch_prefix);
        let worktree_path = self
            .options
            .worktree_base_path
            .join(format!("codepunk-{stamp}-{suffix}"));

        fs::create_dir_all(&self.options.worktree_base_path)
            .map_err(|err| AppError::Io(format!("create worktree base dir: {err}")))?;

        let worktree_str = worktree_path.to_string_lossy().into_owned();
        self.git
            .exec_checked(
                &["worktree", "add", "-b", &branch_name, &worktree_str, "HEAD"],
                &self.workspace_root,
                cancel,
            )
            .await?;

        let mut session = GitSession::new(
            branch_name,
            worktree_path.clone(),
            self.workspace_root.clone(),
        );
        transition(&mut session, SessionState::Active)?;
        self.workdir.set(worktree_path);
        self.state_store.save(&session)?;

        info!(
            session_id = %session.id,
            branch = %session.branch_name,
            worktree = %session.worktree_path.display(),
            "session started"
        );
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Commit all worktree changes as one change-set for a tool call.
    ///
    /// The commit allows an empty tree change, so every successful
    /// mutating tool call leaves exactly one commit in call order. A git
    /// failure leaves the session Active; the caller decides whether the
    /// miss is fatal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` when no session is Active, plus
    /// git/cancel errors from the commit itself.
    pub async fn commit_tool_call(
        &self,
        tool_name: &str,
        summary: &str,
        cancel: &CancellationToken,
    ) -> Result<CommittedToolCall> {
        let mut guard = self.current.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| AppError::Session("commit requested before any session started".into()))?;
        if session.state != SessionState::Active {
            return Err(AppError::Session(format!(
                "cannot commit a tool call in state {:?}",
                session.state
            )));
        }

        let span = info_span!("commit_tool_call", session_id = %session.id, tool = tool_name);
        let _span = span.enter();

        transition(session, SessionState::Committing)?;
        self.state_store.save(session)?;

        let worktree = session.worktree_path.clone();
        let message = format!("{tool_name}: {summary}");
        let committed = self
            .commit_worktree(&worktree, &message, cancel)
            .await;

        match committed {
            Ok(commit_hash) => {
                transition(session, SessionState::Active)?;
                let record = CommittedToolCall {
                    tool_name: tool_name.to_owned(),
                    summary: summary.to_owned(),
                    commit_hash,
                    committed_at: Utc::now(),
                };
                session.committed_tool_calls.push(record.clone());
                session.last_activity_at = Utc::now();
                self.state_store.save(session)?;
                info!(commit = %record.commit_hash, "tool call committed");
                Ok(record)
            }
            Err(err) => {
                warn!(%err, "tool-call commit failed; session stays active");
                transition(session, SessionState::Active)?;
                self.state_store.save(session)?;
                Err(err)
            }
        }
    }

    /// Refresh `last_activity_at` on a live session.
    ///
    /// Tool-reported errors, user cancellations, and read-only calls all
    /// count as activity — they keep the session alive without recording
    /// a commit. A no-op when no session is live.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io`/`AppError::Serialization` if persisting the
    /// refreshed record fails.
    pub async fn update_activity(&self) -> Result<()> {
        let mut guard = self.current.lock().await;
        if let Some(session) = guard.as_mut() {
            if session.state.is_live() {
                session.last_activity_at = Utc::now();
                self.state_store.save(session)?;
            }
        }
        Ok(())
    }

    /// Mark the live session Failed after an unhandled tool error.
    ///
    /// The worktree is removed; the branch is retained when
    /// `keep_failed_session_branches` is set, deleted otherwise. Returns
    /// `None` when no session is live — failing nothing is not an error.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from recording the failed state.
    pub async fn mark_failed(
        &self,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<GitSession>> {
        let mut guard = self.current.lock().await;
        let Some(session) = guard.as_mut() else {
            return Ok(None);
        };
        if !session.state.is_live() {
            return Ok(None);
        }

        let span = info_span!("mark_failed", session_id = %session.id);
        let _span = span.enter();

        transition(session, SessionState::Failed)?;
        session.failure_reason = Some(reason.to_owned());

        let worktree = session.worktree_path.clone();
        self.remove_worktree(&worktree, cancel).await;
        if !self.options.keep_failed_session_branches {
            self.delete_branch(&session.branch_name.clone(), cancel).await;
        }
        self.workdir.clear();
        self.state_store.save(session)?;

        warn!(reason, "session marked failed");
        Ok(Some(session.clone()))
    }

    /// End the Active session explicitly.
    ///
    /// Accept fast-forwards the primary checkout onto the session branch
    /// before cleanup; a diverged primary fails the `--ff-only` merge and
    /// leaves the session Active so the operator can reconcile or
    /// discard. Discard deletes the branch and worktree without merging.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` when no session is Active, or
    /// `AppError::Git` when the fast-forward merge is rejected.
    pub async fn end_session(
        &self,
        action: SessionEndAction,
        cancel: &CancellationToken,
    ) -> Result<GitSession> {
        let mut guard = self.current.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| AppError::Session("no session to end".into()))?;
        if session.state != SessionState::Active {
            return Err(AppError::Session(format!(
                "cannot end a session in state {:?}",
                session.state
            )));
        }

        let span = info_span!("end_session", session_id = %session.id, ?action);
        let _span = span.enter();

        let branch = session.branch_name.clone();
        let worktree = session.worktree_path.clone();

        match action {
            SessionEndAction::Accept => {
                self.git
                    .exec_checked(
                        &["merge", "--ff-only", &branch],
                        &self.workspace_root,
                        cancel,
                    )
                    .await?;
                self.remove_worktree(&worktree, cancel).await;
                self.delete_branch(&branch, cancel).await;
                info!(%branch, "session accepted into primary checkout");
            }
            SessionEndAction::Discard => {
                self.remove_worktree(&worktree, cancel).await;
                self.delete_branch(&branch, cancel).await;
                info!(%branch, "session discarded");
            }
        }

        transition(session, SessionState::Ended)?;
        self.workdir.clear();
        self.state_store.clear()?;
        Ok(session.clone())
    }

    /// Expire the Active session when it has been idle too long.
    ///
    /// Uses the wall clock; see [`check_timeout_at`](Self::check_timeout_at)
    /// for a deterministic sweep.
    ///
    /// # Errors
    ///
    /// Propagates persistence errors from recording the timed-out state.
    pub async fn check_timeout(&self, cancel: &CancellationToken) -> Result<Option<GitSession>> {
        self.check_timeout_at(Utc::now(), cancel).await
    }

    /// Expire the Active session when idle longer than the configured
    /// timeout as of `now`.
    ///
    /// With `auto_revert_on_timeout` the worktree and branch are
    /// discarded (branch kept when `keep_failed_session_branches`); the
    /// primary checkout is never touched. Returns the timed-out session,
    /// or `None` when nothing expired.
    ///
    /// # Errors
    ///
    /// Propagates persistence errors from recording the timed-out state.
    pub async fn check_timeout_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Option<GitSession>> {
        let mut guard = self.current.lock().await;
        let Some(session) = guard.as_mut() else {
            return Ok(None);
        };
        if session.state != SessionState::Active {
            return Ok(None);
        }

        let limit = Duration::minutes(
            i64::try_from(self.options.session_timeout_minutes).unwrap_or(i64::MAX),
        );
        if session.idle_duration(now) <= limit {
            return Ok(None);
        }

        let span = info_span!("session_timeout", session_id = %session.id);
        let _span = span.enter();

        transition(session, SessionState::TimedOut)?;
        if self.options.auto_revert_on_timeout {
            let worktree = session.worktree_path.clone();
            self.remove_worktree(&worktree, cancel).await;
            if !self.options.keep_failed_session_branches {
                self.delete_branch(&session.branch_name.clone(), cancel).await;
            }
        }
        self.workdir.clear();
        self.state_store.save(session)?;

        warn!(
            branch = %session.branch_name,
            idle_minutes = session.idle_duration(now).num_minutes(),
            "session timed out"
        );
        Ok(Some(session.clone()))
    }

    /// Resolve a session left live by a crashed process.
    ///
    /// Runs once at startup when `cleanup_orphaned_sessions_on_startup`
    /// is set: a durable record still Active or Committing belongs to a
    /// dead process, so its stale worktree is deleted and the state is
    /// resolved to TimedOut (when auto-revert) or Ended.
    ///
    /// # Errors
    ///
    /// Propagates persistence errors from recording the resolved state.
    pub async fn recover_orphaned(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<GitSession>> {
        if !self.options.cleanup_orphaned_sessions_on_startup {
            return Ok(None);
        }
        let Some(mut session) = self.state_store.load()? else {
            return Ok(None);
        };
        if !session.state.is_live() {
            return Ok(None);
        }

        let span = info_span!("recover_orphaned", session_id = %session.id);
        let _span = span.enter();
        warn!(
            branch = %session.branch_name,
            state = ?session.state,
            "orphaned session left by a previous process; cleaning up"
        );

        self.remove_worktree(&session.worktree_path.clone(), cancel).await;
        if self.options.auto_revert_on_timeout && !self.options.keep_failed_session_branches {
            self.delete_branch(&session.branch_name.clone(), cancel).await;
        }

        // The owning process is gone: this resolves a durable projection,
        // not a live state machine, so the transition guard does not apply.
        session.state = if self.options.auto_revert_on_timeout {
            SessionState::TimedOut
        } else {
            SessionState::Ended
        };
        self.state_store.save(&session)?;

        info!(state = ?session.state, "orphaned session resolved");
        Ok(Some(session))
    }

    /// Stage and commit everything in the worktree, returning the new
    /// commit hash.
    async fn commit_worktree(
        &self,
        worktree: &Path,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.git
            .exec_checked(&["add", "-A"], worktree, cancel)
            .await?;
        self.git
            .exec_checked(
                &["commit", "--allow-empty", "-m", message],
                worktree,
                cancel,
            )
            .await?;
        let head = self
            .git
            .exec_checked(&["rev-parse", "HEAD"], worktree, cancel)
            .await?;
        Ok(head.trimmed_stdout())
    }

    /// Remove a session worktree, tolerating one that is already gone.
    ///
    /// Falls back to plain directory removal when git does not recognize
    /// the path (e.g., a stale record pointing at a half-deleted tree),
    /// then prunes the worktree list.
    async fn remove_worktree(&self, path: &Path, cancel: &CancellationToken) {
        let path_str = path.to_string_lossy().into_owned();
        match self
            .git
            .exec(
                &["worktree", "remove", "--force", &path_str],
                &self.workspace_root,
                cancel,
            )
            .await
        {
            Ok(output) if output.success() => {}
            Ok(output) => {
                warn!(
                    worktree = %path.display(),
                    stderr = %output.stderr.trim(),
                    "git worktree remove failed; deleting directory directly"
                );
                remove_dir_best_effort(path);
            }
            Err(err) => {
                warn!(worktree = %path.display(), %err, "git worktree remove did not run");
                remove_dir_best_effort(path);
            }
        }
        if let Err(err) = self
            .git
            .exec(&["worktree", "prune"], &self.workspace_root, cancel)
            .await
        {
            warn!(%err, "git worktree prune failed");
        }
    }

    /// Delete a session branch, warning instead of failing — the branch
    /// may already be gone after an external cleanup.
    async fn delete_branch(&self, branch: &str, cancel: &CancellationToken) {
        match self
            .git
            .exec(&["branch", "-D", branch], &self.workspace_root, cancel)
            .await
        {
            Ok(output) if output.success() => {}
            Ok(output) => {
                warn!(branch, stderr = %output.stderr.trim(), "failed to delete session branch");
            }
            Err(err) => {
                warn!(branch, %err, "failed to delete session branch");
            }
        }
    }
}

/// Apply a lifecycle transition, rejecting illegal ones.
fn transition(session: &mut GitSession, next: SessionState) -> Result<()> {
    if !session.can_transition_to(next) {
        return Err(AppError::Session(format!(
            "illegal transition {:?} -> {next:?} for session {}",
            session.state, session.id
        )));
    }
    session.state = next;
    Ok(())
}

fn remove_dir_best_effort(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = fs::remove_dir_all(path) {
        warn!(path = %path.display(), %err, "failed to delete stale worktree directory");
    }
}
