//! Environment-driven gateway configuration.
//!
//! The gateway consumes its configuration; it never writes it. Feature modes
//! gate whether open-access resolution, downloads, and exports run at all.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Default NCBI E-utilities base URL.
pub const DEFAULT_EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
/// Default PMC base URL (repository check).
pub const DEFAULT_PMC_BASE_URL: &str = "https://pmc.ncbi.nlm.nih.gov";
/// Default PMC id-converter endpoint.
pub const DEFAULT_IDCONV_URL: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/idconv/v1.0/";
/// Default Unpaywall base URL (DOI registry).
pub const DEFAULT_UNPAYWALL_BASE_URL: &str = "https://api.unpaywall.org";
/// Default DOI resolver base URL (publisher landing pages).
pub const DEFAULT_DOI_BASE_URL: &str = "https://doi.org";

const DEFAULT_EMAIL: &str = "litgate@example.org";
const DEFAULT_TOOL: &str = "litgate";
const DEFAULT_CACHE_DIR: &str = ".litgate-cache";

/// Characters kept from an abstract in [`AbstractMode::Short`].
pub const SHORT_ABSTRACT_CHARS: usize = 300;

/// Per-probe timeout for open-access sources.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable carried a value outside its accepted set.
    #[error("invalid value '{value}' for {var}: expected {expected}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Rejected value.
        value: String,
        /// Accepted values.
        expected: &'static str,
    },
}

/// How much abstract text is returned with metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AbstractMode {
    /// Truncate to [`SHORT_ABSTRACT_CHARS`].
    #[default]
    Short,
    /// Return the full abstract.
    Long,
}

impl FromStr for AbstractMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "short" | "quick" => Ok(Self::Short),
            "long" | "full" | "deep" => Ok(Self::Long),
            _ => Err(ConfigError::InvalidValue {
                var: "LITGATE_ABSTRACT_MODE",
                value: value.to_string(),
                expected: "short | long",
            }),
        }
    }
}

/// Full-text feature gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FullTextMode {
    /// Detection and downloads are refused.
    #[default]
    Disabled,
    /// Detection and explicit downloads are allowed.
    Enabled,
    /// Like `Enabled`, and open-access hits are downloaded automatically.
    Auto,
}

impl FullTextMode {
    /// Whether detection and explicit downloads may run.
    #[must_use]
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Whether open-access hits are downloaded without an explicit request.
    #[must_use]
    pub fn auto_download(self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl fmt::Display for FullTextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Auto => "auto",
        })
    }
}

impl FromStr for FullTextMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "false" | "0" => Ok(Self::Disabled),
            "enabled" | "on" | "detect" | "true" | "1" => Ok(Self::Enabled),
            "auto" | "auto-download" => Ok(Self::Auto),
            _ => Err(ConfigError::InvalidValue {
                var: "LITGATE_FULLTEXT_MODE",
                value: value.to_string(),
                expected: "disabled | enabled | auto",
            }),
        }
    }
}

fn parse_switch(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" | "enabled" => Ok(true),
        "off" | "false" | "0" | "no" | "disabled" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            expected: "on | off",
        }),
    }
}

/// Resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Optional upstream access token (raises the request quota).
    pub api_key: Option<String>,
    /// Contact address sent with every upstream and Unpaywall request.
    pub email: String,
    /// Registered tool name sent with upstream requests.
    pub tool: String,
    /// Root directory for the persistent tiers.
    pub cache_dir: PathBuf,
    /// Where downloaded documents land; defaults to `<cache_dir>/fulltext`.
    pub download_dir: Option<PathBuf>,
    /// Abstract truncation mode.
    pub abstract_mode: AbstractMode,
    /// Full-text feature gate.
    pub fulltext_mode: FullTextMode,
    /// Whether citation export is available.
    pub export_enabled: bool,
    /// E-utilities base URL.
    pub eutils_base_url: String,
    /// PMC base URL.
    pub pmc_base_url: String,
    /// PMC id-converter endpoint.
    pub idconv_url: String,
    /// Unpaywall base URL.
    pub unpaywall_base_url: String,
    /// DOI resolver base URL.
    pub doi_base_url: String,
    /// Per-probe timeout for open-access sources.
    pub probe_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            email: DEFAULT_EMAIL.to_string(),
            tool: DEFAULT_TOOL.to_string(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            download_dir: None,
            abstract_mode: AbstractMode::default(),
            fulltext_mode: FullTextMode::default(),
            export_enabled: false,
            eutils_base_url: DEFAULT_EUTILS_BASE_URL.to_string(),
            pmc_base_url: DEFAULT_PMC_BASE_URL.to_string(),
            idconv_url: DEFAULT_IDCONV_URL.to_string(),
            unpaywall_base_url: DEFAULT_UNPAYWALL_BASE_URL.to_string(),
            doi_base_url: DEFAULT_DOI_BASE_URL.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a mode variable holds an unknown value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a mode variable holds an unknown value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        config.api_key = get("NCBI_API_KEY");
        if let Some(email) = get("NCBI_EMAIL") {
            config.email = email;
        }
        if let Some(tool) = get("NCBI_TOOL") {
            config.tool = tool;
        }
        if let Some(dir) = get("LITGATE_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        config.download_dir = get("LITGATE_DOWNLOAD_DIR").map(PathBuf::from);
        if let Some(mode) = get("LITGATE_ABSTRACT_MODE") {
            config.abstract_mode = mode.parse()?;
        }
        if let Some(mode) = get("LITGATE_FULLTEXT_MODE") {
            config.fulltext_mode = mode.parse()?;
        }
        if let Some(mode) = get("LITGATE_EXPORT_MODE") {
            config.export_enabled = parse_switch("LITGATE_EXPORT_MODE", &mode)?;
        }
        if let Some(url) = get("LITGATE_EUTILS_BASE_URL") {
            config.eutils_base_url = url;
        }
        Ok(config)
    }

    /// Directory that receives downloaded documents.
    #[must_use]
    pub fn fulltext_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("fulltext"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = GatewayConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.abstract_mode, AbstractMode::Short);
        assert_eq!(config.fulltext_mode, FullTextMode::Disabled);
        assert!(!config.export_enabled);
        assert!(config.api_key.is_none());
        assert_eq!(config.fulltext_dir(), PathBuf::from(".litgate-cache/fulltext"));
    }

    #[test]
    fn test_modes_are_parsed_case_insensitively() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("LITGATE_ABSTRACT_MODE", "LONG"),
            ("LITGATE_FULLTEXT_MODE", "Auto"),
            ("LITGATE_EXPORT_MODE", "on"),
            ("NCBI_API_KEY", "  secret  "),
        ]))
        .unwrap();
        assert_eq!(config.abstract_mode, AbstractMode::Long);
        assert!(config.fulltext_mode.auto_download());
        assert!(config.export_enabled);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let config = GatewayConfig::from_lookup(lookup_from(&[("NCBI_API_KEY", "   ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_unknown_fulltext_mode_is_rejected() {
        let err = GatewayConfig::from_lookup(lookup_from(&[("LITGATE_FULLTEXT_MODE", "maybe")]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("LITGATE_FULLTEXT_MODE"), "{msg}");
        assert!(msg.contains("maybe"), "{msg}");
    }

    #[test]
    fn test_fulltext_mode_gates() {
        assert!(!FullTextMode::Disabled.is_enabled());
        assert!(FullTextMode::Enabled.is_enabled());
        assert!(!FullTextMode::Enabled.auto_download());
        assert!(FullTextMode::Auto.is_enabled());
    }
}
