//! Error types for pressgang.
//!
//! Library crates use [`PressgangError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pressgang operations.
#[derive(Debug, thiserror::Error)]
pub enum PressgangError {
    /// Configuration loading or validation error. Always fatal.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during discovery, acquisition, or provider calls.
    #[error("network error: {0}")]
    Network(String),

    /// Record store or blob store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Generation provider error (transport, API, or exhausted router).
    #[error("provider error: {0}")]
    Provider(String),

    /// Response or document parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (wrong content type, schema mismatch, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Report rendering error.
    #[error("render error: {0}")]
    Render(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PressgangError>;

impl PressgangError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
