//! Upstream bibliographic API access.
//!
//! # Architecture
//!
//! - [`BibliographicApi`] - Async trait for the three upstream request types
//! - [`EutilsClient`] - HTTP implementation against the E-utilities endpoints
//! - [`RateLimiter`] - Process-wide request spacing shared by every upstream caller
//! - [`ArticleSummary`] - Internal metadata shape mapped from upstream responses

mod error;
mod eutils;
mod models;
pub mod rate_limiter;

pub use error::UpstreamError;
pub use eutils::EutilsClient;
pub use models::{ArticleSummary, article_url, parse_efetch_abstracts};
pub use rate_limiter::RateLimiter;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default number of search results.
pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Upper bound for `max_results` on a single search.
pub const MAX_SEARCH_RESULTS: u32 = 100;

/// Upper bound on identifiers in one batch metadata request.
pub const MAX_BATCH_IDENTIFIERS: usize = 200;

/// Result ordering requested from the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Upstream relevance ranking.
    #[default]
    Relevance,
    /// Most recent publication first.
    PubDate,
    /// First author.
    Author,
    /// Journal name.
    Journal,
}

impl SortOrder {
    /// Value sent in the `sort` query parameter.
    #[must_use]
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::PubDate => "pub_date",
            Self::Author => "Author",
            Self::Journal => "JournalName",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Relevance => "relevance",
            Self::PubDate => "pub_date",
            Self::Author => "author",
            Self::Journal => "journal",
        };
        f.write_str(name)
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relevance" => Ok(Self::Relevance),
            "pub_date" | "date" | "pubdate" => Ok(Self::PubDate),
            "author" => Ok(Self::Author),
            "journal" => Ok(Self::Journal),
            other => Err(format!(
                "unknown sort order '{other}' (expected relevance, pub_date, author, journal)"
            )),
        }
    }
}

/// A free-text search request.
///
/// Also serves as the memory-tier cache key, so two requests differing only
/// in surrounding whitespace share an entry (see [`SearchQuery::normalized`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Query text in upstream syntax.
    pub term: String,
    /// Maximum identifiers to return.
    pub max_results: u32,
    /// Restrict to publications from the last N days.
    pub days_back: Option<u32>,
    /// Result ordering.
    pub sort: SortOrder,
}

impl SearchQuery {
    /// Creates a query with default limits and ordering.
    #[must_use]
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            max_results: DEFAULT_MAX_RESULTS,
            days_back: None,
            sort: SortOrder::default(),
        }
    }

    /// Sets `max_results`.
    #[must_use]
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Sets the recency window.
    #[must_use]
    pub fn with_days_back(mut self, days_back: Option<u32>) -> Self {
        self.days_back = days_back;
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Copy with trimmed term and collapsed internal whitespace.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            term: self.term.split_whitespace().collect::<Vec<_>>().join(" "),
            ..self.clone()
        }
    }
}

/// One page of search hits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    /// Total matches reported by the upstream (may exceed `ids.len()`).
    pub total_count: u64,
    /// Identifiers in upstream order.
    pub ids: Vec<String>,
}

/// The upstream bibliographic API.
///
/// Implementations are responsible for honoring the shared [`RateLimiter`]
/// on every request they dispatch.
#[async_trait]
pub trait BibliographicApi: Send + Sync {
    /// Search by query; returns ordered identifiers and the total count.
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, UpstreamError>;

    /// Structured metadata for a batch of identifiers.
    ///
    /// Identifiers the upstream cannot resolve are absent from the map.
    async fn summaries(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, ArticleSummary>, UpstreamError>;

    /// Abstract text for a batch of identifiers.
    async fn abstracts(&self, ids: &[String]) -> Result<HashMap<String, String>, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_query_collapses_whitespace() {
        let query = SearchQuery::new("  crispr   cas9 \n").with_max_results(5);
        let normalized = query.normalized();
        assert_eq!(normalized.term, "crispr cas9");
        assert_eq!(normalized.max_results, 5);
        assert_eq!(normalized, SearchQuery::new("crispr cas9").with_max_results(5));
    }

    #[test]
    fn test_sort_order_round_trips_through_display() {
        for sort in [
            SortOrder::Relevance,
            SortOrder::PubDate,
            SortOrder::Author,
            SortOrder::Journal,
        ] {
            assert_eq!(sort.to_string().parse::<SortOrder>(), Ok(sort));
        }
        assert!("newest".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_sort_order_params() {
        assert_eq!(SortOrder::PubDate.as_param(), "pub_date");
        assert_eq!(SortOrder::Journal.as_param(), "JournalName");
    }
}
