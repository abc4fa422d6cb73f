//! Open-access cascade against mocked sources.

use std::sync::Arc;
use std::time::Duration;

use litgate_core::RateLimiter;
use litgate_core::resolver::{
    OpenAccessResolver, OpenAccessSource, PmcSource, PublisherSource, ResolveTarget,
    UnpaywallSource,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;

use support::socket_guard::start_mock_server_or_skip;

fn cascade(server: &MockServer) -> OpenAccessResolver {
    let base = server.uri();
    let sources: Vec<Box<dyn OpenAccessSource>> = vec![
        Box::new(
            PmcSource::with_base_urls(
                &format!("{base}/pmc"),
                &format!("{base}/idconv"),
                "litgate-test",
                "dev@example.org",
                Arc::new(RateLimiter::disabled()),
            )
            .unwrap(),
        ),
        Box::new(UnpaywallSource::with_base_url(&base, "litgate-test", "dev@example.org").unwrap()),
        Box::new(PublisherSource::with_base_url(&format!("{base}/doi")).unwrap()),
    ];
    OpenAccessResolver::new(sources, Duration::from_secs(5))
}

async fn mount_unpaywall_hit(server: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v2/"))
        .and(query_param("email", "dev@example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "is_oa": true,
            "best_oa_location": {"url_for_pdf": "https://oa.example/paper.pdf"}
        })))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_repository_hit_short_circuits_registry() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/pmc/articles/PMC7654321/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><head><meta name="citation_pdf_url" content="/pmc/articles/PMC7654321/pdf/main.pdf"></head></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    mount_unpaywall_hit(&server, 0).await;

    let target = ResolveTarget::new("31452104")
        .with_pmcid("PMC7654321")
        .with_doi("10.1000/xyz");
    let info = cascade(&server)
        .resolve(&target, &CancellationToken::new())
        .await;

    assert!(info.is_open_access());
    assert_eq!(info.sources(), ["pmc".to_string()]);
    assert_eq!(
        info.download_url(),
        Some(format!("{}/pmc/articles/PMC7654321/pdf/main.pdf", server.uri()).as_str())
    );
}

#[tokio::test]
async fn test_registry_answers_when_repository_has_no_copy() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/idconv"))
        .and(query_param("ids", "31452104"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"records": [{}]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_unpaywall_hit(&server, 1).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/doi/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let target = ResolveTarget::new("31452104").with_doi("10.1000/xyz");
    let info = cascade(&server)
        .resolve(&target, &CancellationToken::new())
        .await;

    assert_eq!(info.sources(), ["unpaywall".to_string()]);
    assert_eq!(info.download_url(), Some("https://oa.example/paper.pdf"));
}

#[tokio::test]
async fn test_failing_sources_degrade_to_publisher_scrape() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/idconv"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v2/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/doi/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><a href="/content/article.pdf">Download PDF</a></body></html>"#,
        ))
        .mount(&server)
        .await;

    let target = ResolveTarget::new("31452104").with_doi("10.1000/xyz");
    let info = cascade(&server)
        .resolve(&target, &CancellationToken::new())
        .await;

    assert!(info.is_open_access());
    assert_eq!(info.sources(), ["publisher".to_string()]);
}

#[tokio::test]
async fn test_no_source_confirms() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path_regex(r"^/v2/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "is_oa": false,
            "best_oa_location": null
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/doi/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>paywall</html>"))
        .mount(&server)
        .await;

    // Non-numeric identifier: the repository source skips the id conversion.
    let target = ResolveTarget::new("doi-only").with_doi("10.1000/xyz");
    let info = cascade(&server)
        .resolve(&target, &CancellationToken::new())
        .await;

    assert!(!info.is_open_access());
    assert!(info.sources().is_empty());
    assert!(info.download_url().is_none());
}
