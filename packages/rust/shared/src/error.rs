//! Error types for postcheck.
//!
//! Library crates use [`PostcheckError`] via `thiserror`.
//! The server app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all postcheck operations.
#[derive(Debug, thiserror::Error)]
pub enum PostcheckError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Caller-supplied input is missing or malformed.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Transport-level failure talking to an upstream service.
    #[error("network error: {0}")]
    Network(String),

    /// An upstream service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// Structured output from an upstream service could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Every search call failed, so there is nothing to fact-check against.
    #[error(
        "research unavailable: all {attempted} search requests failed (check the search API key)"
    )]
    ResearchUnavailable { attempted: usize },

    /// The pipeline budget ran out before a stage that cannot degrade.
    #[error("timed out during {stage}")]
    Timeout { stage: &'static str },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PostcheckError>;

impl PostcheckError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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

    /// Whether the error was caused by the caller rather than the pipeline.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
