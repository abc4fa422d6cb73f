//! Repository source: a PMC article page for the entity's PMCID.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::GatewayConfig;
use crate::http_client::{HttpTimeouts, build_http_client};
use crate::upstream::RateLimiter;
use crate::user_agent::BROWSER_USER_AGENT;

use super::utils::{extract_pmcid, find_pdf_link};
use super::{OpenAccessSource, ProbeError, ResolveTarget, SourceHit};

const SOURCE: &str = "pmc";

#[derive(Debug, Deserialize)]
struct IdConvResponse {
    #[serde(default)]
    records: Vec<IdConvRecord>,
}

#[derive(Debug, Deserialize)]
struct IdConvRecord {
    pmcid: Option<String>,
}

/// Checks PMC for a repository copy.
///
/// When the target has no PMCID, the identifier is converted through the
/// id-converter service first; that call shares the upstream rate limiter.
pub struct PmcSource {
    client: Client,
    pmc_base_url: String,
    idconv_url: String,
    tool: String,
    email: String,
    rate_limiter: Arc<RateLimiter>,
}

impl PmcSource {
    /// Creates the source from gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Client`] when HTTP client construction fails.
    pub fn new(config: &GatewayConfig, rate_limiter: Arc<RateLimiter>) -> Result<Self, ProbeError> {
        Self::with_base_urls(
            &config.pmc_base_url,
            &config.idconv_url,
            &config.tool,
            &config.email,
            rate_limiter,
        )
    }

    /// Creates the source with custom endpoints for tests.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Client`] when HTTP client construction fails.
    pub fn with_base_urls(
        pmc_base_url: &str,
        idconv_url: &str,
        tool: &str,
        email: &str,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, ProbeError> {
        Ok(Self {
            client: build_http_client(SOURCE, BROWSER_USER_AGENT, HttpTimeouts::default())?,
            pmc_base_url: pmc_base_url.trim_end_matches('/').to_string(),
            idconv_url: idconv_url.to_string(),
            tool: tool.to_string(),
            email: email.to_string(),
            rate_limiter,
        })
    }

    async fn convert_id(&self, id: &str) -> Result<Option<String>, ProbeError> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Ok(None);
        }

        self.rate_limiter.acquire().await;
        let response = self
            .client
            .get(&self.idconv_url)
            .query(&[
                ("ids", id),
                ("format", "json"),
                ("tool", self.tool.as_str()),
                ("email", self.email.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProbeError::network(SOURCE, &self.idconv_url, e))?;

        if !response.status().is_success() {
            return Err(ProbeError::HttpStatus {
                source_name: SOURCE,
                url: self.idconv_url.clone(),
                status: response.status().as_u16(),
            });
        }

        let body: IdConvResponse = response
            .json()
            .await
            .map_err(|e| ProbeError::parse(SOURCE, &self.idconv_url, e.to_string()))?;
        Ok(body
            .records
            .into_iter()
            .find_map(|record| record.pmcid.as_deref().and_then(extract_pmcid)))
    }
}

impl std::fmt::Debug for PmcSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PmcSource")
            .field("pmc_base_url", &self.pmc_base_url)
            .field("idconv_url", &self.idconv_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OpenAccessSource for PmcSource {
    fn name(&self) -> &'static str {
        SOURCE
    }

    #[tracing::instrument(skip(self, target), fields(source = SOURCE, id = %target.id))]
    async fn probe(&self, target: &ResolveTarget) -> Result<Option<SourceHit>, ProbeError> {
        let pmcid = match &target.pmcid {
            Some(pmcid) => pmcid.clone(),
            None => match self.convert_id(&target.id).await? {
                Some(pmcid) => pmcid,
                None => {
                    debug!("no PMCID for entity");
                    return Ok(None);
                }
            },
        };

        let page_url = format!("{}/articles/{pmcid}/", self.pmc_base_url);
        let response = self
            .client
            .get(&page_url)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| ProbeError::network(SOURCE, &page_url, e))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Ok(None),
            status => {
                return Err(ProbeError::HttpStatus {
                    source_name: SOURCE,
                    url: page_url,
                    status: status.as_u16(),
                });
            }
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| ProbeError::network(SOURCE, &page_url, e))?;

        let pdf_url = find_pdf_link(&html, &final_url)
            .filter(|url| Url::parse(url).is_ok())
            .unwrap_or_else(|| format!("{}/articles/{pmcid}/pdf/", self.pmc_base_url));

        Ok(Some(SourceHit {
            url: pdf_url,
            pmcid: Some(pmcid),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn source(base: &str) -> PmcSource {
        PmcSource::with_base_urls(
            base,
            &format!("{base}/idconv/"),
            "litgate-test",
            "dev@example.org",
            Arc::new(RateLimiter::disabled()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_probe_converts_id_and_scrapes_citation_pdf() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/idconv/"))
            .and(query_param("ids", "31452104"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "records": [{"pmid": "31452104", "pmcid": "PMC6713123"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/articles/PMC6713123/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<meta name="citation_pdf_url" content="/articles/PMC6713123/pdf/main.pdf">"#,
            ))
            .mount(&server)
            .await;

        let hit = source(&server.uri())
            .probe(&ResolveTarget::new("31452104"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            hit.url,
            format!("{}/articles/PMC6713123/pdf/main.pdf", server.uri())
        );
        assert_eq!(hit.pmcid.as_deref(), Some("PMC6713123"));
    }

    #[tokio::test]
    async fn test_probe_falls_back_to_pdf_path() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/articles/PMC1234567/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>no links</html>"))
            .mount(&server)
            .await;

        let target = ResolveTarget::new("1").with_pmcid("PMC1234567");
        let hit = source(&server.uri()).probe(&target).await.unwrap().unwrap();
        assert_eq!(hit.url, format!("{}/articles/PMC1234567/pdf/", server.uri()));
    }

    #[tokio::test]
    async fn test_probe_without_pmcid_reports_not_found() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/idconv/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [{"pmid": "99", "status": "error"}]
            })))
            .mount(&server)
            .await;

        let result = source(&server.uri()).probe(&ResolveTarget::new("99")).await;
        assert!(result.unwrap().is_none());
    }
}
