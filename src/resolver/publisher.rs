//! Publisher landing-page scrape, reached through the DOI resolver.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::http_client::{HttpTimeouts, build_http_client};
use crate::user_agent::BROWSER_USER_AGENT;

use super::utils::{encode_doi_path, find_pdf_link};
use super::{OpenAccessSource, ProbeError, ResolveTarget, SourceHit};

const SOURCE: &str = "publisher";

/// Follows the DOI to the publisher page and looks for an embedded document link.
///
/// This is a heuristic: a link on a landing page does not guarantee the
/// document is free, so it runs last.
pub struct PublisherSource {
    client: Client,
    doi_base_url: String,
}

impl PublisherSource {
    /// Creates the source from gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Client`] when HTTP client construction fails.
    pub fn new(config: &GatewayConfig) -> Result<Self, ProbeError> {
        Self::with_base_url(&config.doi_base_url)
    }

    /// Creates the source against a custom DOI resolver (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Client`] when HTTP client construction fails.
    pub fn with_base_url(doi_base_url: &str) -> Result<Self, ProbeError> {
        Ok(Self {
            client: build_http_client(SOURCE, BROWSER_USER_AGENT, HttpTimeouts::default())?,
            doi_base_url: doi_base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl std::fmt::Debug for PublisherSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherSource")
            .field("doi_base_url", &self.doi_base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OpenAccessSource for PublisherSource {
    fn name(&self) -> &'static str {
        SOURCE
    }

    #[tracing::instrument(skip(self, target), fields(source = SOURCE, id = %target.id))]
    async fn probe(&self, target: &ResolveTarget) -> Result<Option<SourceHit>, ProbeError> {
        let Some(doi) = target.doi.as_deref() else {
            debug!("no DOI for entity");
            return Ok(None);
        };

        let url = format!("{}/{}", self.doi_base_url, encode_doi_path(doi));
        let response = self
            .client
            .get(&url)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| ProbeError::network(SOURCE, &url, e))?;

        if !response.status().is_success() {
            return Err(ProbeError::HttpStatus {
                source_name: SOURCE,
                url,
                status: response.status().as_u16(),
            });
        }

        let landing = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| ProbeError::network(SOURCE, &url, e))?;

        let found = find_pdf_link(&html, &landing);
        debug!(landing = %landing, found = found.is_some(), "scraped publisher page");
        Ok(found.map(SourceHit::new))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_follows_redirect_and_scrapes_meta() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/10.1000/xyz"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/article/xyz", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/article/xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<head><meta name="citation_pdf_url" content="/article/xyz.pdf"></head>"#,
            ))
            .mount(&server)
            .await;

        let source = PublisherSource::with_base_url(&server.uri()).unwrap();
        let hit = source
            .probe(&ResolveTarget::new("1").with_doi("10.1000/xyz"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.url, format!("{}/article/xyz.pdf", server.uri()));
    }

    #[tokio::test]
    async fn test_page_without_link_is_not_found() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/10.1000/none"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>paywall</html>"))
            .mount(&server)
            .await;

        let source = PublisherSource::with_base_url(&server.uri()).unwrap();
        let result = source
            .probe(&ResolveTarget::new("1").with_doi("10.1000/none"))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
