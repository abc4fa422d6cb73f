//! Shared User-Agent strings for upstream API and download traffic.
//!
//! Upstream and open-access API calls identify the tool honestly; retrieval of
//! the document itself presents a browser identity because several publisher
//! hosts refuse non-browser clients outright.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/litgate";

/// Browser User-Agent presented by the external retrieval tools.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Caller identity for upstream API and open-access source requests.
///
/// `tool` is the registered tool name sent alongside the contact address.
#[must_use]
pub(crate) fn api_user_agent(tool: &str) -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{tool}/{version} (literature-gateway; +{PROJECT_UA_URL})")
}
