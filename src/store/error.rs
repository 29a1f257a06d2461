//! Error types for the store module.

use std::path::PathBuf;

use thiserror::Error;

/// Placeholder id used in diagnostics for records that have none.
pub const MISSING_ID: &str = "<missing id>";

/// Errors that can occur while validating, loading, or persisting seeds.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A question violates a record invariant.
    #[error("invalid question {id}: {reason}")]
    Validation {
        /// The offending record's id, or [`MISSING_ID`].
        id: String,
        /// Which invariant failed.
        reason: String,
    },

    /// Reading a seed file failed.
    #[error("failed to read seed {path}: {source}")]
    Read {
        /// The seed path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a seed file failed.
    #[error("failed to write seed {path}: {source}")]
    Write {
        /// The seed path (or its temporary sibling).
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A seed file holds invalid JSON or the wrong top-level shape.
    #[error("invalid seed JSON at {path}: {source}")]
    Parse {
        /// The seed path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Creates a validation error, substituting [`MISSING_ID`] when the
    /// record has no id.
    pub fn validation(id: Option<&str>, reason: impl Into<String>) -> Self {
        Self::Validation {
            id: id.unwrap_or(MISSING_ID).to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a read error.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }
}
