//! Git session model and lifecycle helpers.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state for an agent git session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session record exists but the worktree has not been created.
    NotStarted,
    /// Session actively accepting tool-call commits.
    Active,
    /// A tool-call commit is in flight.
    Committing,
    /// Session expired after exceeding the idle timeout.
    TimedOut,
    /// A tool execution inside the session raised an unhandled error.
    Failed,
    /// Session explicitly accepted or discarded.
    Ended,
}

impl SessionState {
    /// Whether the session still owns a live worktree.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Committing)
    }
}

/// One committed change-set inside a session: a successful mutating tool
/// call and the commit that captured it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommittedToolCall {
    /// Name of the tool that produced the change-set.
    pub tool_name: String,
    /// One-line summary derived from the tool's arguments.
    pub summary: String,
    /// Worktree commit capturing the change-set.
    pub commit_hash: String,
    /// Commit timestamp.
    pub committed_at: DateTime<Utc>,
}

/// One agent working period, isolated behind a branch/worktree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GitSession {
    /// Unique record identifier.
    pub id: String,
    /// Branch carrying the session's commits.
    pub branch_name: String,
    /// Worktree directory the agent's tool calls are redirected into.
    pub worktree_path: PathBuf,
    /// The repository the session branch belongs to.
    pub workspace_root: PathBuf,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Session start timestamp.
    pub started_at: DateTime<Utc>,
    /// Timestamp of the most recent tool activity.
    pub last_activity_at: DateTime<Utc>,
    /// Ordered change-sets committed so far, one per mutating tool call.
    pub committed_tool_calls: Vec<CommittedToolCall>,
    /// Failure message recorded when the session transitions to `Failed`.
    pub failure_reason: Option<String>,
}

impl GitSession {
    /// Construct a new session record in the `NotStarted` state.
    #[must_use]
    pub fn new(branch_name: String, worktree_path: PathBuf, workspace_root: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            branch_name,
            worktree_path,
            workspace_root,
            state: SessionState::NotStarted,
            started_at: now,
            last_activity_at: now,
            committed_tool_calls: Vec::new(),
            failure_reason: None,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self.state, next),
            (SessionState::NotStarted, SessionState::Active)
                | (
                    SessionState::Active,
                    SessionState::Committing
                        | SessionState::TimedOut
                        | SessionState::Failed
                        | SessionState::Ended
                )
                | (
                    SessionState::Committing,
                    SessionState::Active | SessionState::Failed
                )
        )
    }

    /// How long the session has been idle as of `now`.
    #[must_use]
    pub fn idle_duration(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_activity_at
    }
}
