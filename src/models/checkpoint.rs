//! Checkpoint model for whole-workspace snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable, restorable snapshot of the workspace tied to one tool
/// invocation.
///
/// Created exclusively by the checkpoint store; deleted only by pruning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Checkpoint {
    /// Unique record identifier.
    pub id: String,
    /// Identifier of the tool call that produced this checkpoint.
    pub tool_call_id: String,
    /// Name of the tool that produced this checkpoint.
    pub tool_name: String,
    /// Human-readable description of the triggering operation.
    pub description: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Mirror-repository commit holding the snapshot.
    pub commit_hash: String,
    /// Paths changed relative to the prior checkpoint, sorted.
    pub modified_files: Vec<String>,
}

impl Checkpoint {
    /// Construct a new checkpoint record with a generated identifier.
    #[must_use]
    pub fn new(tool_call_id: String, tool_name: String, description: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_call_id,
            tool_name,
            description,
            created_at: Utc::now(),
            commit_hash: String::new(),
            modified_files: Vec::new(),
        }
    }
}
