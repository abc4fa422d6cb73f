//! Operation surface handed to the calling agent.
//!
//! [`Gateway`] is the one context object built at startup. It owns the shared
//! rate limiter, both cache tiers, the three ledgers, the resolver cascade,
//! and the download stack, and exposes each operation as a plain async method
//! returning an [`OperationResult`]. Nothing below this boundary panics or
//! leaks a Rust error to the caller.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cache::{
    CleanupReport, DEFAULT_RECORD_TTL, EXPORTS_DIR, Ledger, LedgerStats, MemoryCache,
    MemoryCacheStats, PersistentRecordStore, RECORDS_DIR, RecordStoreStats,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{AbstractMode, ConfigError, FullTextMode, GatewayConfig};
use crate::download::{
    BatchDownloadScheduler, BatchItemResult, BatchReport, ContentLengthProbe, DownloadError,
    DownloadOrchestrator, DownloadRecord, DownloadReport, DownloadRequest, Downloader,
    FULLTEXT_TTL, HttpHeadProbe, MAX_BATCH_SIZE, MAX_DOWNLOAD_BYTES, PacingPolicy, Platform,
    RandomPacing, saved_copy, select_downloader,
};
use crate::envelope::OperationResult;
use crate::export::{EXPORT_TTL, ExportFormat, ExportStore, ExportedCitation};
use crate::metadata::{FetchError, MetadataFetcher, SearchResults};
use crate::resolver::{OpenAccessInfo, OpenAccessResolver, ProbeError, ResolveTarget};
use crate::upstream::{
    ArticleSummary, BibliographicApi, EutilsClient, RateLimiter, SearchQuery, UpstreamError,
};

/// Message returned by full-text operations when the feature is off.
pub const FULLTEXT_DISABLED: &str = "full-text mode disabled";
/// Message returned by export operations when the feature is off.
pub const EXPORT_DISABLED: &str = "export mode disabled";

/// Failures while assembling a [`Gateway`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Environment could not be parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The upstream client could not be built.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// An open-access source could not be built.
    #[error(transparent)]
    Resolver(#[from] ProbeError),
    /// The size probe could not be built.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Cache tier selector for [`Gateway::clear_cache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Search results held in memory.
    Memory,
    /// Per-identifier metadata records.
    Records,
    /// Downloaded documents.
    Fulltext,
    /// Rendered citations.
    Exports,
    /// Every tier.
    All,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Records => "records",
            Self::Fulltext => "fulltext",
            Self::Exports => "exports",
            Self::All => "all",
        })
    }
}

impl FromStr for CacheTier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "records" | "metadata" => Ok(Self::Records),
            "fulltext" | "pdf" => Ok(Self::Fulltext),
            "exports" | "export" => Ok(Self::Exports),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown cache tier '{other}' (expected memory, records, fulltext, exports, all)"
            )),
        }
    }
}

/// Active feature modes, echoed in [`CacheStatus`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModeSummary {
    /// Abstract truncation.
    pub abstract_mode: AbstractMode,
    /// Full-text gate.
    pub fulltext_mode: FullTextMode,
    /// Export gate.
    pub export_enabled: bool,
}

/// Rate limiter counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimiterStatus {
    /// Minimum spacing between upstream requests.
    pub min_interval_ms: u64,
    /// Requests dispatched so far.
    pub dispatched: u64,
    /// Total time callers spent waiting.
    pub cumulative_delay_ms: u64,
}

/// Output of [`Gateway::cache_status`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    /// Memory tier.
    pub memory: MemoryCacheStats,
    /// Record tier.
    pub records: RecordStoreStats,
    /// Full-text ledger.
    pub fulltext: LedgerStats,
    /// Export ledger.
    pub exports: LedgerStats,
    /// Upstream throttling.
    pub rate_limiter: RateLimiterStatus,
    /// Feature gates.
    pub modes: ModeSummary,
}

/// Output of [`Gateway::clean_expired`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CleanupSummary {
    /// Record tier.
    pub records: CleanupReport,
    /// Full-text tier.
    pub fulltext: CleanupReport,
    /// Export tier.
    pub exports: CleanupReport,
}

/// Output of [`Gateway::clear_cache`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClearReport {
    /// Tier that was cleared.
    pub tier: CacheTier,
    /// Entries removed across the affected tiers.
    pub removed: usize,
}

/// Output of [`Gateway::fetch_with_fulltext`].
#[derive(Debug, Clone, Serialize)]
pub struct FullTextBundle {
    /// Metadata for resolved identifiers.
    pub articles: Vec<ArticleSummary>,
    /// Availability for each resolved identifier.
    pub availability: Vec<OpenAccessInfo>,
    /// Download results when auto-download is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<BatchReport>,
}

/// Builds a [`Gateway`], letting tests swap in fakes for any collaborator.
pub struct GatewayBuilder {
    config: GatewayConfig,
    clock: Option<Arc<dyn Clock>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    api: Option<Arc<dyn BibliographicApi>>,
    resolver: Option<OpenAccessResolver>,
    downloader: Option<Arc<dyn Downloader>>,
    probe: Option<Arc<dyn ContentLengthProbe>>,
    pacing: Option<Arc<dyn PacingPolicy>>,
}

impl GatewayBuilder {
    /// Clock used for every TTL decision.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Shared upstream limiter (defaults to the quota implied by the API key).
    #[must_use]
    pub fn rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Bibliographic API (defaults to [`EutilsClient`]).
    #[must_use]
    pub fn api(mut self, api: Arc<dyn BibliographicApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Resolver cascade (defaults to [`OpenAccessResolver::from_config`]).
    #[must_use]
    pub fn resolver(mut self, resolver: OpenAccessResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Retrieval tool (defaults to the first one installed, picked on first use).
    #[must_use]
    pub fn downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Size probe (defaults to [`HttpHeadProbe`]).
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn ContentLengthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Batch pacing (defaults to [`RandomPacing`]).
    #[must_use]
    pub fn pacing(mut self, pacing: Arc<dyn PacingPolicy>) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Assembles the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when a default HTTP-backed collaborator
    /// cannot be constructed.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::for_quota(config.api_key.is_some())));

        let api: Arc<dyn BibliographicApi> = match self.api {
            Some(api) => api,
            None => Arc::new(EutilsClient::new(&config, Arc::clone(&rate_limiter))?),
        };
        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => OpenAccessResolver::from_config(&config, Arc::clone(&rate_limiter))?,
        };
        let probe: Arc<dyn ContentLengthProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(HttpHeadProbe::new()?),
        };
        let pacing = self
            .pacing
            .unwrap_or_else(|| Arc::new(RandomPacing::new()));

        let records = Arc::new(PersistentRecordStore::new(
            config.cache_dir.join(RECORDS_DIR),
            DEFAULT_RECORD_TTL,
            Arc::clone(&clock),
        ));
        let fetcher = MetadataFetcher::new(
            api,
            MemoryCache::with_defaults(Arc::clone(&clock)),
            records,
            config.abstract_mode,
        );
        let fulltext = Arc::new(Ledger::new(
            config.fulltext_dir(),
            FULLTEXT_TTL,
            Arc::clone(&clock),
        ));
        let exports = ExportStore::new(
            config.cache_dir.join(EXPORTS_DIR),
            EXPORT_TTL,
            Arc::clone(&clock),
        );

        info!(
            cache_dir = %config.cache_dir.display(),
            fulltext_mode = %config.fulltext_mode,
            export_enabled = config.export_enabled,
            sources = ?resolver.source_names(),
            "gateway ready"
        );

        Ok(Gateway {
            config,
            clock,
            rate_limiter,
            fetcher,
            resolver,
            fulltext,
            exports,
            downloader: self.downloader,
            probe,
            pacing,
            orchestrator: OnceCell::new(),
        })
    }
}

/// Process-wide context exposing every gateway operation.
pub struct Gateway {
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
    rate_limiter: Arc<RateLimiter>,
    fetcher: MetadataFetcher,
    resolver: OpenAccessResolver,
    fulltext: Arc<Ledger<DownloadRecord>>,
    exports: ExportStore,
    downloader: Option<Arc<dyn Downloader>>,
    probe: Arc<dyn ContentLengthProbe>,
    pacing: Arc<dyn PacingPolicy>,
    orchestrator: OnceCell<Arc<DownloadOrchestrator>>,
}

impl Gateway {
    /// Starts a builder over `config`.
    #[must_use]
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            clock: None,
            rate_limiter: None,
            api: None,
            resolver: None,
            downloader: None,
            probe: None,
            pacing: None,
        }
    }

    /// Builds a gateway with production collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when an HTTP client cannot be constructed.
    pub fn from_config(config: GatewayConfig) -> Result<Self, GatewayError> {
        Self::builder(config).build()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Free-text search.
    #[instrument(skip(self), fields(term = %query.term))]
    pub async fn search(&self, query: SearchQuery) -> OperationResult<SearchResults> {
        OperationResult::from_result(self.fetcher.search(&query).await)
    }

    /// Metadata for identifiers; unresolved identifiers are named in the message.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn fetch_summaries(&self, ids: &[String]) -> OperationResult<Vec<ArticleSummary>> {
        match self.fetcher.fetch_summaries(ids).await {
            Ok(slots) => collect_found(ids, slots),
            Err(error) => OperationResult::failure(error.to_string()),
        }
    }

    /// Open-access availability for each identifier, in caller order.
    #[instrument(skip(self, ids, cancel), fields(count = ids.len()))]
    pub async fn detect_fulltext(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> OperationResult<Vec<OpenAccessInfo>> {
        if !self.config.fulltext_mode.is_enabled() {
            return OperationResult::failure(FULLTEXT_DISABLED);
        }
        match self.targets(ids).await {
            Ok(targets) => OperationResult::ok(self.resolve_all(&targets, cancel).await),
            Err(error) => OperationResult::failure(error.to_string()),
        }
    }

    /// Resolves and downloads one document.
    #[instrument(skip(self, cancel))]
    pub async fn download_fulltext(
        &self,
        id: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> OperationResult<DownloadReport> {
        if !self.config.fulltext_mode.is_enabled() {
            return OperationResult::failure(FULLTEXT_DISABLED);
        }
        if !force && let Some(report) = saved_copy(&self.fulltext, id).await {
            info!(path = %report.path.display(), "already downloaded; skipping resolution");
            return OperationResult::ok(report);
        }
        let targets = match self.targets(&[id.to_string()]).await {
            Ok(targets) => targets,
            Err(error) => return OperationResult::failure(error.to_string()),
        };
        let Some(target) = targets.first() else {
            return OperationResult::failure(format!("{id}: identifier not resolved"));
        };

        let info = self.resolver.resolve(target, cancel).await;
        let Some(url) = info.download_url().filter(|_| info.is_open_access()) else {
            return OperationResult::failure(
                DownloadError::NotOpenAccess { id: id.to_string() }.to_string(),
            );
        };

        let orchestrator = match self.orchestrator().await {
            Ok(orchestrator) => orchestrator,
            Err(error) => return OperationResult::failure(error.to_string()),
        };
        let request = DownloadRequest::new(id, url)
            .with_sources(info.sources().to_vec())
            .with_force(force);
        OperationResult::from_result(orchestrator.download(&request, cancel).await)
    }

    /// Resolves and downloads up to [`MAX_BATCH_SIZE`] documents sequentially.
    pub async fn batch_download_fulltext(
        &self,
        ids: &[String],
        force: bool,
        cancel: &CancellationToken,
    ) -> OperationResult<BatchReport> {
        self.batch_download_with_progress(ids, force, cancel, |_, _| {})
            .await
    }

    /// Like [`Self::batch_download_fulltext`], reporting each finished item.
    #[instrument(skip(self, ids, cancel, observe), fields(count = ids.len()))]
    pub async fn batch_download_with_progress<F>(
        &self,
        ids: &[String],
        force: bool,
        cancel: &CancellationToken,
        observe: F,
    ) -> OperationResult<BatchReport>
    where
        F: FnMut(usize, &BatchItemResult) + Send,
    {
        if !self.config.fulltext_mode.is_enabled() {
            return OperationResult::failure(FULLTEXT_DISABLED);
        }
        if ids.len() > MAX_BATCH_SIZE {
            return OperationResult::failure(
                DownloadError::BatchTooLarge {
                    requested: ids.len(),
                    max: MAX_BATCH_SIZE,
                }
                .to_string(),
            );
        }

        // Saved copies keep their slot; only the rest go through resolution.
        let mut slots = Vec::with_capacity(ids.len());
        let mut pending = Vec::new();
        for id in ids {
            let saved = if force {
                None
            } else {
                saved_copy(&self.fulltext, id).await
            };
            match saved {
                Some(report) => slots.push(Some(OpenAccessInfo::previously_saved(
                    id,
                    &report.record.url,
                    &report.record.sources,
                ))),
                None => {
                    pending.push(id.clone());
                    slots.push(None);
                }
            }
        }
        let targets = if pending.is_empty() {
            Vec::new()
        } else {
            match self.targets(&pending).await {
                Ok(targets) => targets,
                Err(error) => return OperationResult::failure(error.to_string()),
            }
        };
        let mut resolved = self.resolve_all(&targets, cancel).await.into_iter();
        let availability: Vec<OpenAccessInfo> = slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| resolved.next()))
            .collect();
        self.run_batch(&availability, force, cancel, observe).await
    }

    /// Metadata plus availability; in `auto` mode also downloads every hit.
    #[instrument(skip(self, ids, cancel), fields(count = ids.len()))]
    pub async fn fetch_with_fulltext(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> OperationResult<FullTextBundle> {
        if !self.config.fulltext_mode.is_enabled() {
            return OperationResult::failure(FULLTEXT_DISABLED);
        }
        let slots = match self.fetcher.fetch_summaries(ids).await {
            Ok(slots) => slots,
            Err(error) => return OperationResult::failure(error.to_string()),
        };
        let articles: Vec<ArticleSummary> = slots.into_iter().flatten().collect();
        let targets: Vec<ResolveTarget> =
            articles.iter().map(ResolveTarget::from_summary).collect();
        let availability = self.resolve_all(&targets, cancel).await;

        let downloads = if self.config.fulltext_mode.auto_download() {
            let hits: Vec<OpenAccessInfo> = availability
                .iter()
                .filter(|info| info.is_open_access())
                .take(MAX_BATCH_SIZE)
                .cloned()
                .collect();
            if hits.len() < availability.iter().filter(|i| i.is_open_access()).count() {
                warn!(max = MAX_BATCH_SIZE, "auto-download truncated to batch cap");
            }
            let report = self.run_batch(&hits, false, cancel, |_, _| {}).await;
            match report.data {
                Some(report) => Some(report),
                None => {
                    return OperationResult::failure(report.message.unwrap_or_default());
                }
            }
        } else {
            None
        };

        OperationResult::ok(FullTextBundle {
            articles,
            availability,
            downloads,
        })
    }

    /// Renders citations for identifiers.
    #[instrument(skip(self, ids), fields(count = ids.len(), %format))]
    pub async fn export_citations(
        &self,
        ids: &[String],
        format: ExportFormat,
    ) -> OperationResult<Vec<ExportedCitation>> {
        if !self.config.export_enabled {
            return OperationResult::failure(EXPORT_DISABLED);
        }
        let slots = match self.fetcher.fetch_full(ids).await {
            Ok(slots) => slots,
            Err(error) => return OperationResult::failure(error.to_string()),
        };

        let mut missing = Vec::new();
        let mut citations = Vec::new();
        for (id, slot) in ids.iter().zip(slots) {
            let Some(summary) = slot else {
                missing.push(id.as_str());
                continue;
            };
            match self.exports.export(&summary, format).await {
                Ok(citation) => citations.push(citation),
                Err(error) => return OperationResult::failure(format!("{id}: {error}")),
            }
        }
        with_missing_note(citations, &missing)
    }

    /// Counters and ledger aggregates for every tier.
    pub async fn cache_status(&self) -> OperationResult<CacheStatus> {
        let status = async {
            Ok::<_, crate::cache::CacheError>(CacheStatus {
                memory: self.fetcher.memory_stats(),
                records: self.fetcher.records().stats().await?,
                fulltext: self.fulltext.reconcile().await?,
                exports: self.exports.ledger().reconcile().await?,
                rate_limiter: RateLimiterStatus {
                    min_interval_ms: millis(self.rate_limiter.min_interval()),
                    dispatched: self.rate_limiter.dispatch_count(),
                    cumulative_delay_ms: millis(self.rate_limiter.cumulative_delay()),
                },
                modes: ModeSummary {
                    abstract_mode: self.config.abstract_mode,
                    fulltext_mode: self.config.fulltext_mode,
                    export_enabled: self.config.export_enabled,
                },
            })
        };
        OperationResult::from_result(status.await)
    }

    /// Deletes expired payloads from every disk tier.
    #[instrument(skip(self))]
    pub async fn clean_expired(&self) -> OperationResult<CleanupSummary> {
        let summary = async {
            Ok::<_, crate::cache::CacheError>(CleanupSummary {
                records: self.fetcher.records().clean_expired().await?,
                fulltext: self.fulltext.clean_expired().await?,
                exports: self.exports.ledger().clean_expired().await?,
            })
        };
        OperationResult::from_result(summary.await)
    }

    /// Empties one tier or all of them.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self, tier: CacheTier) -> OperationResult<ClearReport> {
        let cleared = async {
            let mut removed = 0;
            if matches!(tier, CacheTier::Memory | CacheTier::All) {
                removed += self.fetcher.clear_memory();
            }
            if matches!(tier, CacheTier::Records | CacheTier::All) {
                removed += self.fetcher.records().clear().await?;
            }
            if matches!(tier, CacheTier::Fulltext | CacheTier::All) {
                removed += self.fulltext.clear().await?;
            }
            if matches!(tier, CacheTier::Exports | CacheTier::All) {
                removed += self.exports.ledger().clear().await?;
            }
            Ok::<_, crate::cache::CacheError>(removed)
        };
        match cleared.await {
            Ok(removed) => {
                info!(%tier, removed, "cache cleared");
                OperationResult::ok(ClearReport { tier, removed })
            }
            Err(error) => OperationResult::failure(error.to_string()),
        }
    }

    async fn orchestrator(&self) -> Result<&Arc<DownloadOrchestrator>, DownloadError> {
        self.orchestrator
            .get_or_try_init(|| async {
                let downloader = match &self.downloader {
                    Some(downloader) => Arc::clone(downloader),
                    None => select_downloader(Platform::detect()).await?,
                };
                Ok::<_, DownloadError>(Arc::new(DownloadOrchestrator::new(
                    downloader,
                    Arc::clone(&self.probe),
                    Arc::clone(&self.fulltext),
                    Arc::clone(&self.clock),
                    MAX_DOWNLOAD_BYTES,
                )))
            })
            .await
    }

    async fn run_batch<F>(
        &self,
        items: &[OpenAccessInfo],
        force: bool,
        cancel: &CancellationToken,
        observe: F,
    ) -> OperationResult<BatchReport>
    where
        F: FnMut(usize, &BatchItemResult) + Send,
    {
        if !items.iter().any(OpenAccessInfo::is_open_access) {
            // Nothing to fetch, so skip tool selection entirely.
            return OperationResult::ok_with_message(
                skipped_report(items),
                "no open-access copies found",
            );
        }
        let orchestrator = match self.orchestrator().await {
            Ok(orchestrator) => Arc::clone(orchestrator),
            Err(error) => return OperationResult::failure(error.to_string()),
        };
        let scheduler = BatchDownloadScheduler::new(orchestrator, Arc::clone(&self.pacing));
        OperationResult::from_result(
            scheduler
                .run_with_observer(items, force, cancel, observe)
                .await,
        )
    }

    /// Builds resolve targets, borrowing DOI/PMCID from metadata when available.
    ///
    /// An upstream outage degrades to bare identifiers; the repository source
    /// can still convert those on its own.
    async fn targets(&self, ids: &[String]) -> Result<Vec<ResolveTarget>, FetchError> {
        let slots = match self.fetcher.fetch_full(ids).await {
            Ok(slots) => slots,
            Err(FetchError::Upstream(error)) => {
                warn!(error = %error, "metadata unavailable; resolving bare identifiers");
                vec![None; ids.len()]
            }
            Err(other) => return Err(other),
        };
        Ok(ids
            .iter()
            .zip(slots)
            .map(|(id, slot)| match slot {
                Some(summary) => ResolveTarget::from_summary(&summary),
                None => ResolveTarget::new(id.clone()),
            })
            .collect())
    }

    async fn resolve_all(
        &self,
        targets: &[ResolveTarget],
        cancel: &CancellationToken,
    ) -> Vec<OpenAccessInfo> {
        let mut infos = Vec::with_capacity(targets.len());
        for target in targets {
            infos.push(self.resolver.resolve(target, cancel).await);
        }
        infos
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("orchestrator_ready", &self.orchestrator.initialized())
            .finish_non_exhaustive()
    }
}

fn skipped_report(items: &[OpenAccessInfo]) -> BatchReport {
    use crate::download::BatchItemOutcome;

    let mut report = BatchReport::default();
    for info in items {
        report.items.push(BatchItemResult {
            id: info.id().to_string(),
            outcome: BatchItemOutcome::Skipped {
                reason: "no open-access copy available".to_string(),
            },
        });
        report.skipped += 1;
    }
    report
}

fn collect_found(
    ids: &[String],
    slots: Vec<Option<ArticleSummary>>,
) -> OperationResult<Vec<ArticleSummary>> {
    let mut missing = Vec::new();
    let mut found = Vec::new();
    for (id, slot) in ids.iter().zip(slots) {
        match slot {
            Some(summary) => found.push(summary),
            None => missing.push(id.as_str()),
        }
    }
    with_missing_note(found, &missing)
}

fn with_missing_note<T>(data: T, missing: &[&str]) -> OperationResult<T> {
    if missing.is_empty() {
        OperationResult::ok(data)
    } else {
        OperationResult::ok_with_message(data, format!("not found: {}", missing.join(", ")))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(duration: std::time::Duration) -> u64 {
    duration.as_millis() as u64
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::clock::ManualClock;
    use crate::download::NoPacing;
    use crate::resolver::{OpenAccessSource, SourceHit};
    use crate::test_support::download_fakes::{FakeBehavior, FakeDownloader, FixedProbe};
    use crate::upstream::SearchPage;

    #[derive(Default)]
    struct StubApi {
        summary_calls: AtomicUsize,
    }

    #[async_trait]
    impl BibliographicApi for StubApi {
        async fn search(&self, _query: &SearchQuery) -> Result<SearchPage, UpstreamError> {
            Ok(SearchPage {
                total_count: 2,
                ids: vec!["1".into(), "2".into()],
            })
        }

        async fn summaries(
            &self,
            ids: &[String],
        ) -> Result<HashMap<String, ArticleSummary>, UpstreamError> {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ids
                .iter()
                .filter(|id| id.as_str() != "404")
                .map(|id| {
                    let mut summary = ArticleSummary::new(id.clone(), format!("Title {id}"));
                    summary.doi = Some(format!("10.1000/{id}"));
                    (id.clone(), summary)
                })
                .collect())
        }

        async fn abstracts(
            &self,
            _ids: &[String],
        ) -> Result<HashMap<String, String>, UpstreamError> {
            Ok(HashMap::new())
        }
    }

    /// Confirms every odd identifier.
    struct OddSource;

    #[async_trait]
    impl OpenAccessSource for OddSource {
        fn name(&self) -> &'static str {
            "odd"
        }

        async fn probe(&self, target: &ResolveTarget) -> Result<Option<SourceHit>, ProbeError> {
            let odd = target.id.parse::<u32>().is_ok_and(|n| n % 2 == 1);
            Ok(odd.then(|| SourceHit::new(format!("https://oa.example/{}.pdf", target.id))))
        }
    }

    /// Confirms only the first lookup, like a source that later goes down.
    struct OnceSource {
        probes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OpenAccessSource for OnceSource {
        fn name(&self) -> &'static str {
            "once"
        }

        async fn probe(&self, target: &ResolveTarget) -> Result<Option<SourceHit>, ProbeError> {
            let first = self.probes.fetch_add(1, Ordering::SeqCst) == 0;
            Ok(first.then(|| SourceHit::new(format!("https://oa.example/{}.pdf", target.id))))
        }
    }

    fn gateway(
        dir: &std::path::Path,
        mode: FullTextMode,
        export: bool,
        fake: Arc<FakeDownloader>,
    ) -> (Gateway, Arc<StubApi>) {
        gateway_with_source(dir, mode, export, fake, Box::new(OddSource))
    }

    fn gateway_with_source(
        dir: &std::path::Path,
        mode: FullTextMode,
        export: bool,
        fake: Arc<FakeDownloader>,
        source: Box<dyn OpenAccessSource>,
    ) -> (Gateway, Arc<StubApi>) {
        let config = GatewayConfig {
            cache_dir: dir.to_path_buf(),
            fulltext_mode: mode,
            export_enabled: export,
            ..GatewayConfig::default()
        };
        let api = Arc::new(StubApi::default());
        let gateway = Gateway::builder(config)
            .clock(Arc::new(ManualClock::new(1_000)))
            .rate_limiter(Arc::new(RateLimiter::disabled()))
            .api(api.clone())
            .resolver(OpenAccessResolver::new(vec![source], Duration::from_secs(1)))
            .downloader(fake)
            .probe(Arc::new(FixedProbe(Some(16))))
            .pacing(Arc::new(NoPacing))
            .build()
            .unwrap();
        (gateway, api)
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|id| (*id).to_string()).collect()
    }

    #[tokio::test]
    async fn test_fulltext_operations_fail_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(16)));
        let (gateway, _) = gateway(dir.path(), FullTextMode::Disabled, false, fake.clone());
        let cancel = CancellationToken::new();

        let detect = gateway.detect_fulltext(&ids(&["1"]), &cancel).await;
        assert!(!detect.success);
        assert_eq!(detect.message.as_deref(), Some(FULLTEXT_DISABLED));

        let download = gateway.download_fulltext("1", false, &cancel).await;
        assert_eq!(download.message.as_deref(), Some(FULLTEXT_DISABLED));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);

        let export = gateway
            .export_citations(&ids(&["1"]), ExportFormat::Ris)
            .await;
        assert_eq!(export.message.as_deref(), Some(EXPORT_DISABLED));
    }

    #[tokio::test]
    async fn test_download_requires_open_access_copy() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(16)));
        let (gateway, _) = gateway(dir.path(), FullTextMode::Enabled, false, fake.clone());
        let cancel = CancellationToken::new();

        let closed = gateway.download_fulltext("2", false, &cancel).await;
        assert!(!closed.success);
        assert!(closed.message.unwrap().contains('2'));

        let open = gateway.download_fulltext("1", false, &cancel).await;
        assert!(open.success);
        let report = open.data.unwrap();
        assert_eq!(report.record.sources, vec!["odd".to_string()]);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_saved_download_is_served_without_resolving_again() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(16)));
        let probes = Arc::new(AtomicUsize::new(0));
        let source = Box::new(OnceSource {
            probes: probes.clone(),
        });
        let (gateway, _) =
            gateway_with_source(dir.path(), FullTextMode::Enabled, false, fake.clone(), source);
        let cancel = CancellationToken::new();

        let first = gateway.download_fulltext("1", false, &cancel).await;
        assert!(!first.data.unwrap().cached);

        let second = gateway.download_fulltext("1", false, &cancel).await;
        assert!(second.success, "{:?}", second.message);
        assert!(second.data.unwrap().cached);

        let batch = gateway
            .batch_download_fulltext(&ids(&["1"]), false, &cancel)
            .await
            .data
            .unwrap();
        assert_eq!(batch.saved, 1);
        assert_eq!(probes.load(Ordering::SeqCst), 1);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);

        // Forcing goes back through the cascade, which no longer confirms.
        let forced = gateway.download_fulltext("1", true, &cancel).await;
        assert!(!forced.success);
        assert_eq!(probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_batch_skips_closed_items_and_rejects_oversize() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(16)));
        let (gateway, _) = gateway(dir.path(), FullTextMode::Enabled, false, fake.clone());
        let cancel = CancellationToken::new();

        let result = gateway
            .batch_download_fulltext(&ids(&["1", "2", "3"]), false, &cancel)
            .await;
        let report = result.data.unwrap();
        assert_eq!((report.saved, report.skipped), (2, 1));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);

        let too_many: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        let rejected = gateway
            .batch_download_fulltext(&too_many, false, &cancel)
            .await;
        assert!(!rejected.success);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_with_fulltext_downloads_only_in_auto_mode() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(16)));
        let (enabled, _) = gateway(dir.path(), FullTextMode::Enabled, false, fake.clone());
        let cancel = CancellationToken::new();

        let bundle = enabled
            .fetch_with_fulltext(&ids(&["1", "2"]), &cancel)
            .await
            .data
            .unwrap();
        assert_eq!(bundle.availability.len(), 2);
        assert!(bundle.downloads.is_none());
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);

        let auto_dir = tempfile::tempdir().unwrap();
        let (auto, _) = gateway(auto_dir.path(), FullTextMode::Auto, false, fake.clone());
        let bundle = auto
            .fetch_with_fulltext(&ids(&["1", "2"]), &cancel)
            .await
            .data
            .unwrap();
        assert_eq!(bundle.downloads.unwrap().saved, 1);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_summaries_names_missing_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(16)));
        let (gateway, _) = gateway(dir.path(), FullTextMode::Disabled, false, fake);

        let result = gateway.fetch_summaries(&ids(&["1", "404"])).await;
        assert!(result.success);
        assert_eq!(result.data.unwrap().len(), 1);
        assert_eq!(result.message.as_deref(), Some("not found: 404"));
    }

    #[tokio::test]
    async fn test_export_then_status_then_clear() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(16)));
        let (gateway, api) = gateway(dir.path(), FullTextMode::Disabled, true, fake);

        let citations = gateway
            .export_citations(&ids(&["1", "3"]), ExportFormat::Bibtex)
            .await
            .data
            .unwrap();
        assert_eq!(citations.len(), 2);
        assert!(citations[0].content.starts_with("@article{pmid1,"));

        // Second export reads both records and both citations from disk.
        let again = gateway
            .export_citations(&ids(&["1", "3"]), ExportFormat::Bibtex)
            .await
            .data
            .unwrap();
        assert!(again.iter().all(|c| c.cached));
        assert_eq!(api.summary_calls.load(Ordering::SeqCst), 1);

        let status = gateway.cache_status().await.data.unwrap();
        assert_eq!(status.records.ledger.total_entries, 2);
        assert_eq!(status.exports.total_entries, 2);
        assert_eq!(status.fulltext.total_entries, 0);

        let cleared = gateway.clear_cache(CacheTier::All).await.data.unwrap();
        assert_eq!(cleared.removed, 4);
        let status = gateway.cache_status().await.data.unwrap();
        assert_eq!(status.records.ledger.total_entries, 0);
        assert_eq!(status.exports.total_entries, 0);
    }

    #[test]
    fn test_cache_tier_parsing() {
        assert_eq!("Records".parse::<CacheTier>(), Ok(CacheTier::Records));
        assert_eq!("all".parse::<CacheTier>(), Ok(CacheTier::All));
        assert!("disk".parse::<CacheTier>().is_err());
    }
}
