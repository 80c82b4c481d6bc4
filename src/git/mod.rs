//! Git process execution boundary.
//!
//! All interaction with the external `git` binary goes through
//! [`GitRunner`] — the one genuinely OS-specific, non-deterministic part
//! of the crate.

pub mod runner;

pub use runner::{GitOutput, GitRunner};
