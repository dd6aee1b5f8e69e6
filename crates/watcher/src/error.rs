//! Error type for the watcher

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the public API
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the watcher
#[derive(Debug, Error)]
pub enum Error {
    /// A state machine was asked for a move its table does not allow
    #[error("{machine} can't change state from '{from}' to '{to}', only to: {allowed}")]
    InvalidTransition {
        machine: &'static str,
        from: String,
        to: String,
        allowed: String,
    },

    /// An operation was called in a state where it makes no sense
    #[error("{0}")]
    Usage(String),

    /// Configuration rejected during validation
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed (includes unknown keys)
    #[error("failed to parse configuration")]
    ConfigParse(#[from] toml::de::Error),

    /// An ignore/only pattern is not a valid regular expression
    #[error("invalid pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A watched root is missing or not a directory
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A symlink leads back to one of its own ancestor directories
    #[error(
        "directory {} is already being watched through {}",
        .path.display(),
        .watched_as.display()
    )]
    SymlinkLoop { path: PathBuf, watched_as: PathBuf },

    /// Native notification back-end failure
    #[error("file watcher error")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
