//! Open-access full-text resolution.
//!
//! Sources are probed in a fixed priority order and the cascade stops at the
//! first one that confirms a free copy.
//!
//! # Architecture
//!
//! - [`OpenAccessSource`] - Async trait each source implements
//! - [`OpenAccessResolver`] - Ordered cascade with per-probe timeout and cancellation
//! - [`PmcSource`] - Institutional repository check keyed by PMCID
//! - [`UnpaywallSource`] - DOI-based open-access registry lookup
//! - [`PublisherSource`] - Publisher landing-page scrape
//! - [`OpenAccessInfo`] - Resolution outcome
//!
//! # Example
//!
//! ```no_run
//! use litgate_core::resolver::{OpenAccessResolver, ResolveTarget};
//! use litgate_core::GatewayConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::default();
//! let limiter = std::sync::Arc::new(litgate_core::RateLimiter::for_quota(false));
//! let resolver = OpenAccessResolver::from_config(&config, limiter)?;
//! let target = ResolveTarget::new("31452104").with_doi("10.1038/s41586-019-1497-2");
//! let info = resolver.resolve(&target, &CancellationToken::new()).await;
//! println!("open access: {}", info.is_open_access());
//! # Ok(())
//! # }
//! ```

mod error;
mod pmc;
mod publisher;
mod unpaywall;
pub mod utils;

pub use error::ProbeError;
pub use pmc::PmcSource;
pub use publisher::PublisherSource;
pub use unpaywall::UnpaywallSource;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::GatewayConfig;
use crate::upstream::{ArticleSummary, RateLimiter};

/// Identifiers available for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveTarget {
    /// Entity identifier.
    pub id: String,
    /// DOI, if known.
    pub doi: Option<String>,
    /// Repository identifier, if known.
    pub pmcid: Option<String>,
}

impl ResolveTarget {
    /// Creates a target with only the entity identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            doi: None,
            pmcid: None,
        }
    }

    /// Sets the DOI (normalized; invalid values are dropped).
    #[must_use]
    pub fn with_doi(mut self, doi: &str) -> Self {
        self.doi = utils::normalize_doi(doi);
        self
    }

    /// Sets the repository identifier.
    #[must_use]
    pub fn with_pmcid(mut self, pmcid: &str) -> Self {
        self.pmcid = utils::extract_pmcid(pmcid);
        self
    }

    /// Builds a target from fetched metadata.
    #[must_use]
    pub fn from_summary(summary: &ArticleSummary) -> Self {
        Self {
            id: summary.pmid.clone(),
            doi: summary.doi.as_deref().and_then(utils::normalize_doi),
            pmcid: summary.pmcid.as_deref().and_then(utils::extract_pmcid),
        }
    }
}

/// A source's confirmation of a free copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHit {
    /// Direct document URL.
    pub url: String,
    /// Repository identifier learned while probing.
    pub pmcid: Option<String>,
}

impl SourceHit {
    /// Creates a hit with only a URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pmcid: None,
        }
    }
}

/// Outcome of open-access resolution for one entity.
///
/// `download_url` is present exactly when `is_open_access` is true; the
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAccessInfo {
    id: String,
    is_open_access: bool,
    sources: Vec<String>,
    download_url: Option<String>,
    pmcid: Option<String>,
    doi: Option<String>,
}

impl OpenAccessInfo {
    /// No source confirmed a free copy.
    #[must_use]
    pub fn unavailable(target: &ResolveTarget) -> Self {
        Self {
            id: target.id.clone(),
            is_open_access: false,
            sources: Vec::new(),
            download_url: None,
            pmcid: target.pmcid.clone(),
            doi: target.doi.clone(),
        }
    }

    /// `source` confirmed a free copy at `hit.url`.
    #[must_use]
    pub fn available(target: &ResolveTarget, source: &str, hit: SourceHit) -> Self {
        Self {
            id: target.id.clone(),
            is_open_access: true,
            sources: vec![source.to_string()],
            download_url: Some(hit.url),
            pmcid: hit.pmcid.or_else(|| target.pmcid.clone()),
            doi: target.doi.clone(),
        }
    }

    /// A copy fetched earlier from `url`; no source is probed again.
    #[must_use]
    pub fn previously_saved(id: &str, url: &str, sources: &[String]) -> Self {
        Self {
            id: id.to_string(),
            is_open_access: true,
            sources: sources.to_vec(),
            download_url: Some(url.to_string()),
            pmcid: None,
            doi: None,
        }
    }

    /// Entity identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether a free copy was found.
    #[must_use]
    pub fn is_open_access(&self) -> bool {
        self.is_open_access
    }

    /// Sources that confirmed availability, in probe order.
    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Selected download URL.
    #[must_use]
    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }

    /// Repository identifier.
    #[must_use]
    pub fn pmcid(&self) -> Option<&str> {
        self.pmcid.as_deref()
    }

    /// Canonical document identifier.
    #[must_use]
    pub fn doi(&self) -> Option<&str> {
        self.doi.as_deref()
    }
}

/// One open-access source in the cascade.
///
/// `Ok(None)` means "this source has no free copy" (including when the target
/// lacks the identifier the source needs). Errors are logged by the resolver
/// and treated the same way.
#[async_trait]
pub trait OpenAccessSource: Send + Sync {
    /// Short stable name reported in [`OpenAccessInfo::sources`].
    fn name(&self) -> &'static str;

    /// Checks for a free copy.
    async fn probe(&self, target: &ResolveTarget) -> Result<Option<SourceHit>, ProbeError>;
}

/// Ordered cascade over [`OpenAccessSource`]s.
pub struct OpenAccessResolver {
    sources: Vec<Box<dyn OpenAccessSource>>,
    probe_timeout: Duration,
}

impl OpenAccessResolver {
    /// Creates a resolver probing `sources` in the given order.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn OpenAccessSource>>, probe_timeout: Duration) -> Self {
        Self {
            sources,
            probe_timeout,
        }
    }

    /// Builds the default cascade: repository, DOI registry, publisher page.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Client`] when an HTTP client cannot be built.
    pub fn from_config(
        config: &GatewayConfig,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, ProbeError> {
        let sources: Vec<Box<dyn OpenAccessSource>> = vec![
            Box::new(PmcSource::new(config, rate_limiter)?),
            Box::new(UnpaywallSource::new(config)?),
            Box::new(PublisherSource::new(config)?),
        ];
        Ok(Self::new(sources, config.probe_timeout))
    }

    /// Names of the configured sources, in probe order.
    #[must_use]
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    /// Probes sources in order and stops at the first confirmation.
    ///
    /// Probe failures and timeouts count as "not found". Cancellation stops
    /// the cascade and reports no availability.
    #[instrument(skip(self, cancel), fields(id = %target.id))]
    pub async fn resolve(
        &self,
        target: &ResolveTarget,
        cancel: &CancellationToken,
    ) -> OpenAccessInfo {
        for source in &self.sources {
            let name = source.name();
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(source = name, "resolution cancelled");
                    return OpenAccessInfo::unavailable(target);
                }
                outcome = tokio::time::timeout(self.probe_timeout, source.probe(target)) => outcome,
            };

            match outcome {
                Ok(Ok(Some(hit))) => {
                    info!(source = name, url = %hit.url, "open-access copy found");
                    return OpenAccessInfo::available(target, name, hit);
                }
                Ok(Ok(None)) => debug!(source = name, "source reported no free copy"),
                Ok(Err(error)) => {
                    warn!(source = name, error = %error, "probe failed; trying next source");
                }
                Err(_) => warn!(
                    source = name,
                    error = %ProbeError::Timeout {
                        source_name: name,
                        after: self.probe_timeout,
                    },
                    "probe timed out; trying next source"
                ),
            }
        }
        OpenAccessInfo::unavailable(target)
    }
}

impl std::fmt::Debug for OpenAccessResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAccessResolver")
            .field("sources", &self.source_names())
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}
