//! Transparent session-aware decorator over the tool dispatcher.
//!
//! Wraps the tool-dispatch boundary: mutating tool calls lazily start a
//! git session and commit one change-set per successful call; read-only
//! calls pass through untouched. Session bookkeeping failures degrade to
//! logged diagnostics — the tool's own result is never replaced.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn};

use crate::session::SessionManager;
use crate::Result;

use super::{ToolDescriptor, ToolDispatcher, ToolResult};

/// Tool names that never mutate the workspace and never start a session.
const READ_ONLY_TOOLS: &[&str] = &["read_file", "list_files", "search_files", "grep", "glob"];

/// Longest commit summary recorded per tool call.
const MAX_SUMMARY_CHARS: usize = 72;

/// Whether a tool is exempt from session management.
#[must_use]
pub fn is_read_only_tool(tool_name: &str) -> bool {
    READ_ONLY_TOOLS.contains(&tool_name)
}

/// Derive a one-line commit summary from a tool's arguments.
///
/// File-shaped tools contribute their target path, shell-shaped tools
/// the head of the command line; anything else falls back to the tool
/// name. Truncated to a fixed width.
#[must_use]
pub fn derive_summary(tool_name: &str, arguments: &Value) -> String {
    let summary = arguments
        .get("file_path")
        .or_else(|| arguments.get("path"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| {
            arguments
                .get("command")
                .and_then(Value::as_str)
                .and_then(|command| command.split_whitespace().next())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| tool_name.to_owned());
    summary.chars().take(MAX_SUMMARY_CHARS).collect()
}

/// Session-aware decorator implementing [`ToolDispatcher`].
pub struct SessionInterceptor {
    inner: Arc<dyn ToolDispatcher>,
    sessions: Arc<SessionManager>,
}

impl SessionInterceptor {
    /// Wrap an inner dispatcher with session management.
    #[must_use]
    pub fn new(inner: Arc<dyn ToolDispatcher>, sessions: Arc<SessionManager>) -> Self {
        Self { inner, sessions }
    }
}

#[async_trait]
impl ToolDispatcher for SessionInterceptor {
    fn tools(&self) -> Vec<ToolDescriptor> {
        self.inner.tools()
    }

    fn tool(&self, name: &str) -> Option<ToolDescriptor> {
        self.inner.tool(name)
    }

    fn llm_tools(&self) -> Vec<Value> {
        self.inner.llm_tools()
    }

    async fn execute(
        &self,
        tool_name: &str,
        arguments: &Value,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        if !self.sessions.is_enabled() {
            return self.inner.execute(tool_name, arguments, cancel).await;
        }

        let span = info_span!("intercept_tool", tool = tool_name);
        let _span = span.enter();

        let mutating = !is_read_only_tool(tool_name);
        if mutating && self.sessions.options().auto_start_session {
            // The tool call still runs against the primary checkout when
            // session setup fails; the miss is surfaced, not fatal.
            if let Err(err) = self.sessions.begin_session(cancel).await {
                warn!(%err, tool = tool_name, "failed to start git session");
            }
        }

        match self.inner.execute(tool_name, arguments, cancel).await {
            Ok(result) => {
                let commit_worthy = mutating && !result.is_error && !result.user_cancelled;
                let live = self
                    .sessions
                    .current_session()
                    .await
                    .is_some_and(|session| session.state.is_live());

                if commit_worthy && live {
                    let summary = derive_summary(tool_name, arguments);
                    if let Err(err) = self
                        .sessions
                        .commit_tool_call(tool_name, &summary, cancel)
                        .await
                    {
                        warn!(%err, tool = tool_name, "failed to commit tool call");
                    }
                } else if live {
                    // Errors, cancellations, and read-only calls keep the
                    // session alive without a commit.
                    if let Err(err) = self.sessions.update_activity().await {
                        warn!(%err, "failed to refresh session activity");
                    }
                }
                Ok(result)
            }
            Err(err) => {
                // The one deliberate exception path: an unhandled fault in
                // the inner dispatcher fails the session and re-raises.
                if let Err(mark_err) = self.sessions.mark_failed(&err.to_string(), cancel).await {
                    warn!(%mark_err, "failed to mark session failed");
                }
                Err(err)
            }
        }
    }
}
