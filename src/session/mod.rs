//! Git session isolation.
//!
//! When the workspace is a repository, an agent working period runs behind
//! an ephemeral branch/worktree: one commit per mutating tool call, idle
//! timeout with auto-revert, explicit accept/discard, and durable state
//! for orphan recovery across process restarts.

pub mod manager;
pub mod state_store;
pub mod timeout;
pub mod workdir;

pub use manager::{SessionEndAction, SessionManager};
pub use state_store::SessionStateStore;
pub use timeout::spawn_timeout_sweep;
pub use workdir::WorkingDirOverride;
