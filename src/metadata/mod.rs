//! Cache-aware metadata retrieval.
//!
//! Lookups go memory tier (whole search results) → persistent record tier
//! (per identifier) → upstream, populating both tiers on the way back.

mod error;

pub use error::FetchError;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cache::{MemoryCache, MemoryCacheStats, PersistentRecordStore};
use crate::config::{AbstractMode, SHORT_ABSTRACT_CHARS};
use crate::upstream::{
    ArticleSummary, BibliographicApi, MAX_BATCH_IDENTIFIERS, MAX_SEARCH_RESULTS, SearchQuery,
};

/// Results of a free-text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    /// The normalized query that produced these results.
    pub query: SearchQuery,
    /// Total matches reported upstream.
    pub total_count: u64,
    /// Resolved articles in upstream order.
    pub articles: Vec<ArticleSummary>,
    /// True when served from the memory tier.
    #[serde(default)]
    pub from_cache: bool,
}

/// Orchestrates the cache tiers in front of a [`BibliographicApi`].
pub struct MetadataFetcher {
    api: Arc<dyn BibliographicApi>,
    search_cache: MemoryCache<SearchQuery, SearchResults>,
    records: Arc<PersistentRecordStore>,
    abstract_mode: AbstractMode,
}

impl MetadataFetcher {
    /// Creates a fetcher over the given tiers.
    #[must_use]
    pub fn new(
        api: Arc<dyn BibliographicApi>,
        search_cache: MemoryCache<SearchQuery, SearchResults>,
        records: Arc<PersistentRecordStore>,
        abstract_mode: AbstractMode,
    ) -> Self {
        Self {
            api,
            search_cache,
            records,
            abstract_mode,
        }
    }

    /// Runs a search, serving repeated identical queries from memory.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidQuery`] for an empty term or out-of-range
    /// `max_results`, and [`FetchError::Upstream`] when the upstream fails.
    #[instrument(skip(self), fields(term = %query.term))]
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResults, FetchError> {
        let key = query.normalized();
        if key.term.is_empty() {
            return Err(FetchError::InvalidQuery("query text is empty".to_string()));
        }
        if key.max_results == 0 || key.max_results > MAX_SEARCH_RESULTS {
            return Err(FetchError::InvalidQuery(format!(
                "max_results must be between 1 and {MAX_SEARCH_RESULTS}, got {}",
                key.max_results
            )));
        }

        if let Some(mut cached) = self.search_cache.get(&key) {
            debug!("search served from memory cache");
            cached.from_cache = true;
            cached.articles = self.present_all(cached.articles);
            return Ok(cached);
        }

        let page = self.api.search(&key).await?;
        let articles: Vec<ArticleSummary> = self
            .fetch_full(&page.ids)
            .await?
            .into_iter()
            .flatten()
            .collect();
        info!(
            total = page.total_count,
            returned = articles.len(),
            "search completed"
        );

        let results = SearchResults {
            query: key.clone(),
            total_count: page.total_count,
            articles,
            from_cache: false,
        };
        self.search_cache.set(key, results.clone());

        Ok(SearchResults {
            articles: self.present_all(results.articles),
            ..results
        })
    }

    /// Fetches metadata for identifiers, in caller order.
    ///
    /// Identifiers the upstream does not resolve yield `None` in their slot.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::TooManyIdentifiers`] above the batch cap and
    /// [`FetchError::Upstream`] when the batched upstream call fails.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn fetch_summaries(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<ArticleSummary>>, FetchError> {
        Ok(self
            .fetch_full(ids)
            .await?
            .into_iter()
            .map(|slot| slot.map(|summary| self.present(summary)))
            .collect())
    }

    /// Like [`Self::fetch_summaries`] but without abstract truncation.
    pub(crate) async fn fetch_full(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<ArticleSummary>>, FetchError> {
        if ids.len() > MAX_BATCH_IDENTIFIERS {
            return Err(FetchError::TooManyIdentifiers {
                requested: ids.len(),
                max: MAX_BATCH_IDENTIFIERS,
            });
        }

        let ordered: Vec<String> = ids.iter().map(|id| id.trim().to_string()).collect();
        let mut seen = HashSet::new();
        let unique: Vec<&String> = ordered
            .iter()
            .filter(|id| !id.is_empty() && seen.insert(id.as_str()))
            .collect();

        let mut resolved: HashMap<String, ArticleSummary> = HashMap::new();
        let mut uncached = Vec::new();
        for id in unique {
            match self.records.get(id).await {
                Some(summary) => {
                    resolved.insert(id.clone(), summary);
                }
                None => uncached.push(id.clone()),
            }
        }
        debug!(
            cached = resolved.len(),
            uncached = uncached.len(),
            "partitioned identifiers"
        );

        if !uncached.is_empty() {
            let mut fetched = self.api.summaries(&uncached).await?;
            self.enrich_abstracts(&mut fetched).await;
            for (id, summary) in &fetched {
                self.records.set(id, summary).await;
            }
            let unresolved = uncached.len() - fetched.len().min(uncached.len());
            if unresolved > 0 {
                debug!(unresolved, "upstream did not resolve every identifier");
            }
            resolved.extend(fetched);
        }

        Ok(ordered
            .iter()
            .map(|id| resolved.get(id).cloned())
            .collect())
    }

    async fn enrich_abstracts(&self, fetched: &mut HashMap<String, ArticleSummary>) {
        let missing: Vec<String> = fetched
            .iter()
            .filter(|(_, summary)| summary.abstract_text.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        if missing.is_empty() {
            return;
        }

        match self.api.abstracts(&missing).await {
            Ok(abstracts) => {
                for (id, text) in abstracts {
                    if let Some(summary) = fetched.get_mut(&id) {
                        summary.abstract_text = Some(text);
                    }
                }
            }
            Err(error) => {
                warn!(error = %error, "abstract enrichment failed; continuing without abstracts");
            }
        }
    }

    /// Memory-tier counters.
    #[must_use]
    pub fn memory_stats(&self) -> MemoryCacheStats {
        self.search_cache.stats()
    }

    /// Drops every memory-tier entry.
    pub fn clear_memory(&self) -> usize {
        self.search_cache.clear()
    }

    /// The persistent record tier.
    #[must_use]
    pub fn records(&self) -> &Arc<PersistentRecordStore> {
        &self.records
    }

    fn present_all(&self, articles: Vec<ArticleSummary>) -> Vec<ArticleSummary> {
        articles.into_iter().map(|a| self.present(a)).collect()
    }

    fn present(&self, mut summary: ArticleSummary) -> ArticleSummary {
        if self.abstract_mode == AbstractMode::Short
            && let Some(text) = summary.abstract_text.take()
        {
            summary.abstract_text = Some(truncate_abstract(&text, SHORT_ABSTRACT_CHARS));
        }
        summary
    }
}

impl std::fmt::Debug for MetadataFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataFetcher")
            .field("abstract_mode", &self.abstract_mode)
            .finish_non_exhaustive()
    }
}

/// Truncates `text` to at most `max_chars` characters, appending `...` when cut.
#[must_use]
pub fn truncate_abstract(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
