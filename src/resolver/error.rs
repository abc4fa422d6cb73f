//! Errors from individual open-access probes.
//!
//! A [`ProbeError`] never escapes the resolver: the cascade logs it and moves
//! on to the next source.

use std::time::Duration;

use thiserror::Error;

use crate::http_client::HttpClientError;

/// Why a single source probe failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Network-level failure.
    #[error("{source_name} probe network error for {url}: {error}")]
    Network {
        /// Source name.
        source_name: &'static str,
        /// URL being probed.
        url: String,
        /// Underlying client error.
        #[source]
        error: reqwest::Error,
    },

    /// Unexpected status (anything but success or a definitive "not found").
    #[error("{source_name} probe got HTTP {status} from {url}")]
    HttpStatus {
        /// Source name.
        source_name: &'static str,
        /// URL being probed.
        url: String,
        /// Status code.
        status: u16,
    },

    /// Response body could not be interpreted.
    #[error("{source_name} probe could not parse response from {url}: {reason}")]
    Parse {
        /// Source name.
        source_name: &'static str,
        /// URL being probed.
        url: String,
        /// Details.
        reason: String,
    },

    /// The probe exceeded its time budget.
    #[error("{source_name} probe timed out after {after:?}")]
    Timeout {
        /// Source name.
        source_name: &'static str,
        /// Budget that elapsed.
        after: Duration,
    },

    /// Client construction failed.
    #[error(transparent)]
    Client(#[from] HttpClientError),
}

impl ProbeError {
    /// Creates a network error.
    #[must_use]
    pub fn network(
        source_name: &'static str,
        url: impl Into<String>,
        error: reqwest::Error,
    ) -> Self {
        Self::Network {
            source_name,
            url: url.into(),
            error,
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(
        source_name: &'static str,
        url: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Parse {
            source_name,
            url: url.into(),
            reason: reason.into(),
        }
    }
}
