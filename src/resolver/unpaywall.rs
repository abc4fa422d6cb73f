//! DOI registry source backed by the Unpaywall v2 API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::http_client::{HttpTimeouts, build_http_client};
use crate::user_agent;

use super::utils::encode_doi_path;
use super::{OpenAccessSource, ProbeError, ResolveTarget, SourceHit};

const SOURCE: &str = "unpaywall";

#[derive(Debug, Deserialize)]
struct UnpaywallRecord {
    #[serde(default)]
    is_oa: bool,
    best_oa_location: Option<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
    url: Option<String>,
}

impl UnpaywallRecord {
    fn best_url(self) -> Option<String> {
        if !self.is_oa {
            return None;
        }
        let location = self.best_oa_location?;
        location
            .url_for_pdf
            .filter(|u| !u.trim().is_empty())
            .or(location.url.filter(|u| !u.trim().is_empty()))
    }
}

/// Looks a DOI up in the open-access registry.
pub struct UnpaywallSource {
    client: Client,
    base_url: String,
    email: String,
}

impl UnpaywallSource {
    /// Creates the source from gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Client`] when HTTP client construction fails.
    pub fn new(config: &GatewayConfig) -> Result<Self, ProbeError> {
        Self::with_base_url(&config.unpaywall_base_url, &config.tool, &config.email)
    }

    /// Creates the source against a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Client`] when HTTP client construction fails.
    pub fn with_base_url(base_url: &str, tool: &str, email: &str) -> Result<Self, ProbeError> {
        Ok(Self {
            client: build_http_client(
                SOURCE,
                user_agent::api_user_agent(tool),
                HttpTimeouts::default(),
            )?,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
        })
    }
}

impl std::fmt::Debug for UnpaywallSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnpaywallSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OpenAccessSource for UnpaywallSource {
    fn name(&self) -> &'static str {
        SOURCE
    }

    #[tracing::instrument(skip(self, target), fields(source = SOURCE, id = %target.id))]
    async fn probe(&self, target: &ResolveTarget) -> Result<Option<SourceHit>, ProbeError> {
        let Some(doi) = target.doi.as_deref() else {
            debug!("no DOI for entity");
            return Ok(None);
        };
        if self.email.trim().is_empty() {
            debug!("no contact email configured");
            return Ok(None);
        }

        let url = format!("{}/v2/{}", self.base_url, encode_doi_path(doi));
        let response = self
            .client
            .get(&url)
            .query(&[("email", self.email.as_str())])
            .send()
            .await
            .map_err(|e| ProbeError::network(SOURCE, &url, e))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Ok(None),
            status => {
                return Err(ProbeError::HttpStatus {
                    source_name: SOURCE,
                    url,
                    status: status.as_u16(),
                });
            }
        }

        let record: UnpaywallRecord = response
            .json()
            .await
            .map_err(|e| ProbeError::parse(SOURCE, &url, e.to_string()))?;
        Ok(record.best_url().map(SourceHit::new))
    }
}
