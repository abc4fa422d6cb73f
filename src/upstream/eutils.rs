//! HTTP client for the E-utilities search, summary, and fetch endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, instrument, warn};

use crate::config::GatewayConfig;
use crate::http_client::{HttpTimeouts, build_http_client};
use crate::user_agent;

use super::models::{EsearchResponse, EsummaryResponse, map_esummary, parse_efetch_abstracts};
use super::{
    ArticleSummary, BibliographicApi, RateLimiter, SearchPage, SearchQuery, UpstreamError,
};

const DATABASE: &str = "pubmed";

/// E-utilities client.
///
/// Every request passes through the shared [`RateLimiter`] and carries the
/// caller identity (`tool`, `email`, optional `api_key`).
pub struct EutilsClient {
    client: Client,
    base_url: String,
    tool: String,
    email: String,
    api_key: Option<String>,
    rate_limiter: Arc<RateLimiter>,
}

impl EutilsClient {
    /// Creates a client from gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Client`] when client construction fails.
    pub fn new(
        config: &GatewayConfig,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, UpstreamError> {
        Self::with_base_url(
            &config.eutils_base_url,
            &config.tool,
            &config.email,
            config.api_key.clone(),
            rate_limiter,
        )
    }

    /// Creates a client against a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Client`] when client construction fails.
    pub fn with_base_url(
        base_url: &str,
        tool: &str,
        email: &str,
        api_key: Option<String>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, UpstreamError> {
        let client = build_http_client(
            "eutils",
            user_agent::api_user_agent(tool),
            HttpTimeouts::default(),
        )?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tool: tool.to_string(),
            email: email.to_string(),
            api_key,
            rate_limiter,
        })
    }

    fn identity_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", DATABASE.to_string()),
            ("tool", self.tool.clone()),
            ("email", self.email.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    async fn get(
        &self,
        endpoint: &'static str,
        params: &[(&'static str, String)],
    ) -> Result<Response, UpstreamError> {
        let url = format!("{}/{endpoint}.fcgi", self.base_url);
        let mut query = self.identity_params();
        query.extend_from_slice(params);

        self.rate_limiter.acquire().await;
        debug!(endpoint, "dispatching upstream request");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "upstream returned error status");
            return Err(UpstreamError::HttpStatus {
                endpoint,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl std::fmt::Debug for EutilsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EutilsClient")
            .field("base_url", &self.base_url)
            .field("tool", &self.tool)
            .field("email", &self.email)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BibliographicApi for EutilsClient {
    #[instrument(skip(self), fields(term = %query.term, max_results = query.max_results))]
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, UpstreamError> {
        let mut params = vec![
            ("term", query.term.clone()),
            ("retmax", query.max_results.to_string()),
            ("retmode", "json".to_string()),
            ("sort", query.sort.as_param().to_string()),
        ];
        if let Some(days) = query.days_back {
            params.push(("datetype", "pdat".to_string()));
            params.push(("reldate", days.to_string()));
        }

        let body: EsearchResponse = self
            .get("esearch", &params)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::parse("esearch", e.to_string()))?;

        let Some(result) = body.esearchresult else {
            return Err(UpstreamError::parse("esearch", "response has no esearchresult"));
        };
        if let Some(error) = result.error {
            return Err(UpstreamError::parse("esearch", error));
        }

        let total_count = result
            .count
            .as_deref()
            .and_then(|count| count.trim().parse::<u64>().ok())
            .unwrap_or(result.idlist.len() as u64);

        debug!(total_count, returned = result.idlist.len(), "search complete");
        Ok(SearchPage {
            total_count,
            ids: result.idlist,
        })
    }

    #[instrument(skip(self), fields(count = ids.len()))]
    async fn summaries(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, ArticleSummary>, UpstreamError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let params = [("id", ids.join(",")), ("retmode", "json".to_string())];

        let body: EsummaryResponse = self
            .get("esummary", &params)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::parse("esummary", e.to_string()))?;

        map_esummary(body)
    }

    #[instrument(skip(self), fields(count = ids.len()))]
    async fn abstracts(&self, ids: &[String]) -> Result<HashMap<String, String>, UpstreamError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let params = [("id", ids.join(",")), ("retmode", "xml".to_string())];

        let xml = self
            .get("efetch", &params)
            .await?
            .text()
            .await
            .map_err(|e| UpstreamError::from_reqwest("efetch", e))?;

        Ok(parse_efetch_abstracts(&xml))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn client_for(base_url: &str, api_key: Option<&str>) -> EutilsClient {
        EutilsClient::with_base_url(
            base_url,
            "litgate-test",
            "dev@example.org",
            api_key.map(str::to_string),
            Arc::new(RateLimiter::disabled()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_sends_identity_and_window_params() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .and(query_param("db", "pubmed"))
            .and(query_param("term", "crispr"))
            .and(query_param("retmax", "5"))
            .and(query_param("tool", "litgate-test"))
            .and(query_param("email", "dev@example.org"))
            .and(query_param("api_key", "k3y"))
            .and(query_param("reldate", "30"))
            .and(query_param("sort", "pub_date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "1234", "idlist": ["3", "2", "1"]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Some("k3y"));
        let query = SearchQuery::new("crispr")
            .with_max_results(5)
            .with_days_back(Some(30))
            .with_sort(super::super::SortOrder::PubDate);
        let page = client.search(&query).await.unwrap();

        assert_eq!(page.total_count, 1234);
        assert_eq!(page.ids, vec!["3", "2", "1"]);
    }

    #[tokio::test]
    async fn test_search_non_success_is_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), None);
        let err = client.search(&SearchQuery::new("x")).await.unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::HttpStatus {
                endpoint: "esearch",
                status: 503
            }
        ));
    }

    #[tokio::test]
    async fn test_summaries_joins_ids_in_one_request() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/esummary.fcgi"))
            .and(query_param("id", "10,20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {
                    "uids": ["10", "20"],
                    "10": {"uid": "10", "title": "Ten"},
                    "20": {"uid": "20", "title": "Twenty"}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), None);
        let summaries = client
            .summaries(&["10".to_string(), "20".to_string()])
            .await
            .unwrap();
        assert_eq!(summaries["10"].title, "Ten");
        assert_eq!(summaries["20"].title, "Twenty");
    }

    #[tokio::test]
    async fn test_empty_batches_make_no_request() {
        let client = client_for("http://127.0.0.1:9", None);
        assert!(client.summaries(&[]).await.unwrap().is_empty());
        assert!(client.abstracts(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let client = client_for("http://localhost", Some("very-secret"));
        let debug = format!("{client:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("redacted"));
    }
}
