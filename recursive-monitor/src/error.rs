//! Error types for the recursive monitor.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while monitoring a directory tree.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Root path does not resolve or does not exist.
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Root path exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotDirectory(PathBuf),

    /// The facility refused to register a watch.
    #[error("failed to watch {}: {source}", path.display())]
    WatchFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory could not be enumerated while extending the tree.
    #[error("failed to read directory {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid ignore/notice pattern.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Reading pending events from the facility failed.
    #[error("failed to read events: {0}")]
    Drain(#[source] std::io::Error),

    /// The facility dropped events because its queue filled up.
    #[error("event queue overflowed, some changes were lost")]
    Overflow,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// TOML parse error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Whether this error only affects part of the tree and the monitor keeps running.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::NotFound(_) | Self::NotDirectory(_))
    }
}
