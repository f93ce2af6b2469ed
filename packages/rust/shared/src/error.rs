//! Error types for Regwatch.
//!
//! Library crates use [`RegwatchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Regwatch operations.
#[derive(Debug, thiserror::Error)]
pub enum RegwatchError {
    /// Missing credential or invalid setting. Raised before any cycle work begins.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP failure after the fetcher exhausted its retries.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Malformed or absent structured output from the extraction service.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Store unreachable or constraint violation.
    #[error("storage error: {0}")]
    Storage(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad locator, unknown impact level, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RegwatchError>;

impl RegwatchError {
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

    /// Whether this error must abort the current scan cycle.
    ///
    /// Fetch and extraction failures are tallied per source/change; store and
    /// configuration failures are not recoverable within a cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Config { .. })
    }
}
