//! Tool dispatch contract and session interception.
//!
//! [`ToolDispatcher`] is the consumed boundary of the host's tool
//! registry; the crate never implements tools itself.
//! [`SessionInterceptor`] implements the same trait, so it drops into any
//! call site expecting the registry directly.

pub mod interceptor;

pub use interceptor::{derive_summary, is_read_only_tool, SessionInterceptor};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Metadata for one registered tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// Tool name as referenced in tool calls.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema of the tool's arguments object.
    pub input_schema: Value,
}

/// Result envelope returned by tool execution.
///
/// A tool-reported error travels inside the envelope; an `Err` from
/// [`ToolDispatcher::execute`] is reserved for unhandled faults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolResult {
    /// Primary tool output delivered back to the agent loop.
    pub content: String,
    /// Whether the tool reported an error.
    pub is_error: bool,
    /// Error detail when `is_error` is set.
    pub error_message: Option<String>,
    /// Whether the user cancelled the call before completion.
    pub user_cancelled: bool,
}

impl ToolResult {
    /// Successful result carrying tool output.
    #[must_use]
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Tool-reported error.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Call abandoned by the user before completion.
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            user_cancelled: true,
            ..Self::default()
        }
    }
}

/// Dispatch interface of the host's tool registry.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// All registered tools.
    fn tools(&self) -> Vec<ToolDescriptor>;

    /// Look up one tool by name.
    fn tool(&self, name: &str) -> Option<ToolDescriptor>;

    /// Tool definitions in the wire shape sent with an LLM request.
    fn llm_tools(&self) -> Vec<Value>;

    /// Execute one tool call to completion.
    ///
    /// # Errors
    ///
    /// Implementations return `Err` only for unhandled faults; a
    /// tool-reported error is an `Ok` result with
    /// [`ToolResult::is_error`] set.
    async fn execute(
        &self,
        tool_name: &str,
        arguments: &Value,
        cancel: &CancellationToken,
    ) -> Result<ToolResult>;
}
