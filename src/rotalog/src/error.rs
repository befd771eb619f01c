//! Error types for rotalog.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the rotating writer and its housekeeping.
///
/// Only [`RotateError::Pattern`], the I/O variants and [`RotateError::Closed`]
/// ever reach a caller of `write`. Lock and sweep failures are reported
/// through `tracing` by the writer and never fail a write.
#[derive(Debug, Error)]
pub enum RotateError {
    /// The filename template could not be compiled.
    #[error("invalid filename pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    /// A parent directory of the target file could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The target file could not be opened for append.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing or flushing the current handle failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The advisory lock sentinel could not be created or inspected.
    #[error("failed to acquire lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The discovery glob could not be evaluated.
    #[error("retention sweep over {pattern:?} failed: {reason}")]
    Sweep { pattern: String, reason: String },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The writer has been closed.
    #[error("writer is closed")]
    Closed,
}

impl RotateError {
    pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<RotateError> for io::Error {
    fn from(err: RotateError) -> Self {
        match err {
            RotateError::Io(e) => e,
            RotateError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, RotateError::Closed),
            other => io::Error::other(other),
        }
    }
}

/// Result type for rotalog operations.
pub type Result<T> = std::result::Result<T, RotateError>;
