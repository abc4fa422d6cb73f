//! Shared helpers for open-access sources and response parsing: static regexes,
//! link extraction, and light HTML/XML text cleanup.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// `citation_pdf_url` meta tag, in either attribute order.
pub static CITATION_PDF_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<meta\s+[^>]*(?:name|property)\s*=\s*["']citation_pdf_url["'][^>]*content\s*=\s*["']([^"']+)["']|<meta\s+[^>]*content\s*=\s*["']([^"']+)["'][^>]*(?:name|property)\s*=\s*["']citation_pdf_url["']"#,
    )
});

/// Anchor whose target looks like a PDF.
pub static PDF_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)href\s*=\s*["']([^"']*(?:/pdf/[^"']*|\.pdf(?:\?[^"']*)?))["']"#)
});

/// A PMC identifier anywhere in a string.
pub static PMCID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)\b(PMC\d{4,})\b"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<[^>]+>"));

/// Tags that separate words when removed.
static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"(?is)</?(?:p|br|div|li|ul|ol|tr|td|th|h[1-6]|table|sec|title|abstracttext)\b[^>]*>",
    )
});

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\s+"));

/// Resolves a possibly relative URL string against a base URL.
///
/// Returns the value as-is if it already starts with `http://` or `https://`;
/// normalizes `//...` to `https:...`; otherwise joins with `base_url`.
#[must_use]
pub fn absolutize_url(value: &str, base_url: &Url) -> Option<String> {
    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(value.to_string());
    }
    if value.starts_with("//") {
        return Some(format!("https:{value}"));
    }
    base_url.join(value).ok().map(|url| url.to_string())
}

/// Finds the best embedded document link in a landing page.
///
/// Prefers `citation_pdf_url`, then the first PDF-looking anchor.
#[must_use]
pub fn find_pdf_link(html: &str, base_url: &Url) -> Option<String> {
    let from_meta = CITATION_PDF_RE.captures(html).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| decode_html_entities(m.as_str().trim()))
    });
    let raw = from_meta.or_else(|| {
        PDF_LINK_RE
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| decode_html_entities(m.as_str().trim()))
    })?;
    if raw.is_empty() {
        return None;
    }
    absolutize_url(&raw, base_url)
}

/// Extracts and uppercases a PMCID from `value`.
#[must_use]
pub fn extract_pmcid(value: &str) -> Option<String> {
    PMCID_RE
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// Normalizes a DOI: trims, strips resolver prefixes, lowercases.
///
/// Returns `None` unless the result starts with `10.`.
#[must_use]
pub fn normalize_doi(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let lower = trimmed.to_ascii_lowercase();
    let stripped = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower)
        .trim();
    stripped
        .starts_with("10.")
        .then(|| stripped.to_string())
}

/// Percent-encodes each DOI path segment, keeping the `/` separators.
#[must_use]
pub fn encode_doi_path(doi: &str) -> String {
    doi.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Removes tags, collapses whitespace, and trims.
///
/// Inline tags (`<i>`, `<sup>`) vanish without a trace; block tags become a space.
#[must_use]
pub fn strip_markup(value: &str) -> String {
    let separated = BLOCK_TAG_RE.replace_all(value, " ");
    let without_tags = TAG_RE.replace_all(&separated, "");
    WHITESPACE_RE
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}

/// Decodes the handful of entities that appear in upstream XML and meta tags.
#[must_use]
pub fn decode_html_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
