//! Error types for the download module.
//!
//! Every variant carries the identifier and the URL or path involved so a
//! caller can decide whether retrying makes sense.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheError;
use crate::http_client::HttpClientError;

/// Errors from single and batch downloads.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The document exceeds the size cap.
    #[error("{id}: document at {url} is too large ({size} bytes, limit {limit})")]
    TooLarge {
        /// Entity identifier.
        id: String,
        /// Download URL.
        url: String,
        /// Advertised or actual size.
        size: u64,
        /// Size cap.
        limit: u64,
    },

    /// The retrieval tool reported failure.
    #[error("{id}: {tool} failed for {url} (exit {}): {diagnostic}", exit_label(.exit_code))]
    ToolFailed {
        /// Entity identifier.
        id: String,
        /// Download URL.
        url: String,
        /// Tool name.
        tool: &'static str,
        /// Process exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Trimmed stderr/stdout of the tool.
        diagnostic: String,
    },

    /// The tool exited cleanly but produced no bytes.
    #[error("{id}: {tool} produced an empty file for {url}")]
    EmptyFile {
        /// Entity identifier.
        id: String,
        /// Download URL.
        url: String,
        /// Tool name.
        tool: &'static str,
    },

    /// The tool ran past its time budget and was killed.
    #[error("{tool} timed out after {after:?} fetching {url}")]
    Timeout {
        /// Tool name.
        tool: &'static str,
        /// Download URL.
        url: String,
        /// Budget that elapsed.
        after: Duration,
    },

    /// No retrieval tool is installed for this platform.
    #[error("no download tool available on {platform} (tried: {tried})")]
    NoTool {
        /// Detected platform.
        platform: String,
        /// Tools checked.
        tried: String,
    },

    /// The tool process could not be started.
    #[error("could not start {tool}: {source}")]
    Spawn {
        /// Tool name.
        tool: &'static str,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Filesystem failure around the downloaded file.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The URL is not an absolute http(s) URL.
    #[error("invalid download URL: {url}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
    },

    /// The entity has no confirmed open-access copy.
    #[error("{id}: no open-access copy available")]
    NotOpenAccess {
        /// Entity identifier.
        id: String,
    },

    /// The operation was cancelled before it finished.
    #[error("{id}: download cancelled")]
    Cancelled {
        /// Entity identifier.
        id: String,
    },

    /// More entities than one batch allows.
    #[error("batch of {requested} exceeds the limit of {max} items")]
    BatchTooLarge {
        /// Items supplied.
        requested: usize,
        /// Batch cap.
        max: usize,
    },

    /// An HTTP client could not be constructed.
    #[error(transparent)]
    Client(#[from] HttpClientError),

    /// The full-text ledger could not be updated.
    #[error(transparent)]
    Ledger(#[from] CacheError),
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl DownloadError {
    /// Creates an IO error for `path`.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a fresh attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ToolFailed { .. }
                | Self::EmptyFile { .. }
                | Self::Timeout { .. }
                | Self::Cancelled { .. }
                | Self::Io { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failed_message_carries_diagnostic() {
        let err = DownloadError::ToolFailed {
            id: "1".into(),
            url: "https://x/a.pdf".into(),
            tool: "curl",
            exit_code: Some(22),
            diagnostic: "The requested URL returned error: 403".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("curl"), "{msg}");
        assert!(msg.contains("exit 22"), "{msg}");
        assert!(msg.contains("403"), "{msg}");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_too_large_is_not_retryable() {
        let err = DownloadError::TooLarge {
            id: "1".into(),
            url: "u".into(),
            size: 60,
            limit: 50,
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("too large"));
    }
}
