//! Error types for upstream API calls.

use thiserror::Error;

use crate::http_client::HttpClientError;

/// Errors from the upstream bibliographic API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Network-level failure (DNS, connect, TLS, body read).
    #[error("network error calling {endpoint}: {source}")]
    Network {
        /// Endpoint name (`esearch`, `esummary`, `efetch`, ...).
        endpoint: &'static str,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded its timeout.
    #[error("timeout calling {endpoint}")]
    Timeout {
        /// Endpoint name.
        endpoint: &'static str,
    },

    /// Non-success HTTP status.
    #[error("{endpoint} returned HTTP {status}{}", hint_suffix(.status))]
    HttpStatus {
        /// Endpoint name.
        endpoint: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// The response body did not match the expected shape.
    #[error("unexpected {endpoint} response: {reason}")]
    Parse {
        /// Endpoint name.
        endpoint: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The client could not be constructed.
    #[error(transparent)]
    Client(#[from] HttpClientError),
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn hint_suffix(status: &u16) -> &'static str {
    match *status {
        429 => " (request quota exceeded; configure an API key or slow down)",
        400 => " (query rejected by upstream)",
        s if s >= 500 => " (upstream unavailable; try again later)",
        _ => "",
    }
}

impl UpstreamError {
    /// Maps a `reqwest` send/read failure, separating timeouts.
    #[must_use]
    pub fn from_reqwest(endpoint: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { endpoint }
        } else {
            Self::Network { endpoint, source }
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(endpoint: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            endpoint,
            reason: reason.into(),
        }
    }

    /// Whether retrying later could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } | Self::Client(_) => false,
        }
    }
}
