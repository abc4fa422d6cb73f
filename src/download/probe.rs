//! Pre-flight size check before any bytes are written.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::http_client::{HttpTimeouts, build_http_client};
use crate::user_agent::BROWSER_USER_AGENT;

use super::DownloadError;
use super::constants::{CONNECT_TIMEOUT, PROBE_TIMEOUT};

/// Reports the advertised size of a resource.
#[async_trait]
pub trait ContentLengthProbe: Send + Sync {
    /// Returns the advertised length, or `None` when the server does not say.
    ///
    /// Probe failures are not fatal: they yield `None` and the size is
    /// checked again after the transfer.
    async fn content_length(
        &self,
        id: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<u64>, DownloadError>;
}

/// HEAD-request probe.
#[derive(Debug, Clone)]
pub struct HttpHeadProbe {
    client: Client,
}

impl HttpHeadProbe {
    /// Creates a probe presenting the browser identity.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] when the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, DownloadError> {
        let client = build_http_client(
            "size-probe",
            BROWSER_USER_AGENT,
            HttpTimeouts {
                connect: CONNECT_TIMEOUT,
                request: PROBE_TIMEOUT,
            },
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentLengthProbe for HttpHeadProbe {
    async fn content_length(
        &self,
        id: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<u64>, DownloadError> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::Cancelled { id: id.to_string() }),
            response = self.client.head(url).send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                warn!(url, error = %error, "size probe failed; checking size after transfer");
                return Ok(None);
            }
        };
        if !response.status().is_success() {
            debug!(url, status = response.status().as_u16(), "size probe got non-success status");
            return Ok(None);
        }

        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok()))
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
    async fn test_head_probe_reads_content_length() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("HEAD"))
            .and(path("/big.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 123_456]))
            .mount(&server)
            .await;

        let probe = HttpHeadProbe::new().unwrap();
        let length = probe
            .content_length("1", &format!("{}/big.pdf", server.uri()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(length, Some(123_456));
    }

    #[tokio::test]
    async fn test_head_probe_failure_is_unknown_size() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;

        let probe = HttpHeadProbe::new().unwrap();
        let length = probe
            .content_length("1", &format!("{}/x.pdf", server.uri()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(length, None);
    }
}
