//! Errors from the metadata fetch path.

use thiserror::Error;

use crate::upstream::UpstreamError;

/// Caller-visible metadata fetch failures.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request was malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// More identifiers than one batch allows.
    #[error("too many identifiers: {requested} requested, at most {max} per request")]
    TooManyIdentifiers {
        /// Identifiers supplied.
        requested: usize,
        /// Batch cap.
        max: usize,
    },

    /// The upstream call on the primary path failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
