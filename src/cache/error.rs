//! Error types for the persistent cache tiers.
//!
//! These errors never reach an operation caller through the read path:
//! [`super::PersistentRecordStore`] logs them and reports a miss. Ledger
//! maintenance operations (`clean_expired`, `clear`) do surface them.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from ledger and payload file access.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure on a specific path.
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A ledger or record could not be encoded or decoded.
    #[error("cache file {path} is not valid JSON: {source}")]
    Serde {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The advisory lock on a ledger could not be taken.
    #[error("could not lock ledger {path}: {source}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A blocking filesystem task was cancelled or panicked.
    #[error("cache worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CacheError {
    /// Creates an I/O error for `path`.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a serialization error for `path`.
    #[must_use]
    pub fn serde(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serde {
            path: path.into(),
            source,
        }
    }
}
