//! Shared HTTP client construction policy.
//!
//! The upstream client, every open-access source, and the download size probe
//! build their `reqwest` clients here so timeout, identity, compression, and
//! proxy handling stay consistent.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::Client;
use reqwest::{ClientBuilder, Proxy};
use thiserror::Error;
use tracing::warn;

/// Default connect timeout for API traffic.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default overall request timeout for API traffic.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client construction failure.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The builder rejected the configuration.
    #[error("HTTP client construction failed for {component}: {reason}")]
    Build {
        /// Component that requested the client.
        component: String,
        /// Builder failure text.
        reason: String,
    },
}

/// Timeouts applied to a client.
#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    /// TCP/TLS connect timeout.
    pub connect: Duration,
    /// Whole-request timeout.
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            request: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Builds an HTTP client using the shared project policy.
///
/// `component` is only used in error messages and logs.
///
/// # Errors
///
/// Returns [`HttpClientError`] when client construction fails.
pub fn build_http_client(
    component: &str,
    user_agent: impl Into<String>,
    timeouts: HttpTimeouts,
) -> Result<Client, HttpClientError> {
    let user_agent = user_agent.into();

    match try_build_client(&user_agent, timeouts, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed macOS environments panic while reading system
            // proxy settings; retry with env-proxy support only.
            warn!(
                component,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            match try_build_client(&user_agent, timeouts, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(HttpClientError::Build {
                    component: component.to_string(),
                    reason: "client construction panicked".to_string(),
                }),
                Err(BuildClientFailure::Build(error)) => Err(HttpClientError::Build {
                    component: component.to_string(),
                    reason: error.to_string(),
                }),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(HttpClientError::Build {
            component: component.to_string(),
            reason: error.to_string(),
        }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    user_agent: &str,
    timeouts: HttpTimeouts,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .user_agent(user_agent)
            .gzip(true);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    let names: &[&str] = match scheme {
        "https" => &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"],
        "http" => &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"],
        _ => return None,
    };
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client_with_defaults() {
        let client = build_http_client("test", "litgate-test/0.0", HttpTimeouts::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_env_proxy_for_unknown_scheme_is_none() {
        assert!(env_proxy_for_scheme("ftp").is_none());
    }
}
