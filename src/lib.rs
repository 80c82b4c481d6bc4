#![forbid(unsafe_code)]

//! `codepunk-rollback` — workspace checkpointing and git session isolation
//! for autonomous coding agents.
//!
//! Two cooperating engines behind a tool-execution interceptor:
//!
//! - [`checkpoint::CheckpointStore`] snapshots the whole workspace into a
//!   hidden git mirror and restores any prior snapshot, whether or not the
//!   workspace itself is under version control.
//! - [`session::SessionManager`] isolates an agent working period behind an
//!   ephemeral branch/worktree of the user's repository, committing one
//!   change-set per mutating tool call and auto-reverting on idle timeout.
//! - [`dispatch::SessionInterceptor`] decorates the host's tool dispatcher,
//!   lazily starting sessions for mutating tool calls and recording a
//!   human-readable commit summary per call.

pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod git;
pub mod models;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
