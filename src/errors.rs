//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The git binary could not be located or started.
    GitUnavailable(String),
    /// Git ran but the command reported a non-zero exit status.
    Git(String),
    /// An operation was invoked before `initialize`.
    NotInitialized(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// A metadata or state record is unreadable or corrupt.
    Serialization(String),
    /// Illegal session lifecycle transition or session misuse.
    Session(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Operation aborted via cooperative cancellation.
    Cancelled,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::GitUnavailable(msg) => write!(f, "git unavailable: {msg}"),
            Self::Git(msg) => write!(f, "git: {msg}"),
            Self::NotInitialized(msg) => write!(f, "not initialized: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
