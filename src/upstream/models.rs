//! Upstream response shapes and their mapping into [`ArticleSummary`].

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::resolver::utils::{compile_static_regex, decode_html_entities, strip_markup};

use super::UpstreamError;

/// Landing page template for an identifier.
const ARTICLE_URL_PREFIX: &str = "https://pubmed.ncbi.nlm.nih.gov";

/// Entity metadata in the internal shape served to callers and persisted in the record tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSummary {
    /// Stable upstream identifier.
    pub pmid: String,
    /// Article title.
    pub title: String,
    /// Author display names in upstream order.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Journal abbreviation (falls back to the full name).
    #[serde(default)]
    pub journal: String,
    /// Full journal name when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_full: Option<String>,
    /// Publication date as printed upstream (e.g. `2023 Mar 14`).
    #[serde(default)]
    pub pub_date: String,
    /// Four-digit year extracted from `pub_date`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Journal volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    /// Journal issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    /// Page range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    /// Digital object identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Repository identifier (`PMC1234567`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,
    /// Publication types (`Journal Article`, `Review`, ...).
    #[serde(default)]
    pub publication_types: Vec<String>,
    /// Full abstract when enrichment succeeded.
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    /// Canonical landing page.
    #[serde(default)]
    pub url: String,
}

impl ArticleSummary {
    /// Creates a summary with only the identifier and title populated.
    #[must_use]
    pub fn new(pmid: impl Into<String>, title: impl Into<String>) -> Self {
        let pmid = pmid.into();
        Self {
            url: article_url(&pmid),
            pmid,
            title: title.into(),
            authors: Vec::new(),
            journal: String::new(),
            journal_full: None,
            pub_date: String::new(),
            year: None,
            volume: None,
            issue: None,
            pages: None,
            doi: None,
            pmcid: None,
            publication_types: Vec::new(),
            abstract_text: None,
        }
    }
}

/// Landing page for an identifier.
#[must_use]
pub fn article_url(pmid: &str) -> String {
    format!("{ARTICLE_URL_PREFIX}/{pmid}/")
}

// ==================== esearch ====================

#[derive(Debug, Deserialize)]
pub(crate) struct EsearchResponse {
    pub esearchresult: Option<EsearchResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EsearchResult {
    pub count: Option<String>,
    #[serde(default)]
    pub idlist: Vec<String>,
    #[serde(rename = "ERROR")]
    pub error: Option<String>,
}

// ==================== esummary ====================

#[derive(Debug, Deserialize)]
pub(crate) struct EsummaryResponse {
    pub result: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct EsummaryDoc {
    uid: Option<String>,
    title: Option<String>,
    #[serde(default)]
    authors: Vec<EsummaryAuthor>,
    source: Option<String>,
    fulljournalname: Option<String>,
    pubdate: Option<String>,
    volume: Option<String>,
    issue: Option<String>,
    pages: Option<String>,
    elocationid: Option<String>,
    #[serde(default)]
    articleids: Vec<EsummaryArticleId>,
    #[serde(default)]
    pubtype: Vec<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EsummaryAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EsummaryArticleId {
    idtype: String,
    value: String,
}

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\b(1[89]|20)\d{2}\b"));
static ELOCATION_DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)doi:\s*(10\.\S+)"));

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Maps an esummary `result` object into summaries keyed by identifier.
///
/// Identifiers the upstream could not resolve (per-uid `error`) are absent.
pub(crate) fn map_esummary(
    response: EsummaryResponse,
) -> Result<HashMap<String, ArticleSummary>, UpstreamError> {
    let Some(result) = response.result else {
        return Err(UpstreamError::parse("esummary", "response has no result object"));
    };

    let uids: Vec<String> = result
        .get("uids")
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or_default();

    let mut summaries = HashMap::with_capacity(uids.len());
    for uid in uids {
        let Some(raw) = result.get(&uid) else {
            continue;
        };
        let doc: EsummaryDoc = match serde_json::from_value(raw.clone()) {
            Ok(doc) => doc,
            Err(error) => {
                debug!(uid = %uid, error = %error, "skipping malformed esummary document");
                continue;
            }
        };
        if let Some(error) = &doc.error {
            debug!(uid = %uid, error = %error, "upstream did not resolve identifier");
            continue;
        }
        let summary = map_doc(&uid, doc);
        summaries.insert(uid, summary);
    }
    Ok(summaries)
}

fn map_doc(uid: &str, doc: EsummaryDoc) -> ArticleSummary {
    let pmid = doc.uid.clone().unwrap_or_else(|| uid.to_string());
    let mut summary = ArticleSummary::new(
        pmid,
        decode_html_entities(doc.title.as_deref().unwrap_or_default().trim()),
    );

    summary.authors = doc
        .authors
        .into_iter()
        .filter_map(|author| non_empty(author.name))
        .collect();
    summary.journal_full = non_empty(doc.fulljournalname);
    summary.journal = non_empty(doc.source)
        .or_else(|| summary.journal_full.clone())
        .unwrap_or_default();
    summary.pub_date = doc.pubdate.unwrap_or_default().trim().to_string();
    summary.year = YEAR_RE
        .find(&summary.pub_date)
        .map(|m| m.as_str().to_string());
    summary.volume = non_empty(doc.volume);
    summary.issue = non_empty(doc.issue);
    summary.pages = non_empty(doc.pages);
    summary.publication_types = doc.pubtype;

    for id in &doc.articleids {
        let value = id.value.trim();
        if value.is_empty() {
            continue;
        }
        match id.idtype.as_str() {
            "doi" if summary.doi.is_none() => summary.doi = Some(value.to_string()),
            "pmc" if summary.pmcid.is_none() => summary.pmcid = Some(value.to_ascii_uppercase()),
            _ => {}
        }
    }
    if summary.doi.is_none() {
        summary.doi = doc
            .elocationid
            .as_deref()
            .and_then(|loc| ELOCATION_DOI_RE.captures(loc))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches('.').to_string());
    }

    summary
}

// ==================== efetch ====================

static ARTICLE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?s)<PubmedArticle\b.*?</PubmedArticle>")
});
static PMID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"<PMID[^>]*>\s*(\d+)\s*</PMID>"));
static ABSTRACT_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?s)<AbstractText([^>]*)>(.*?)</AbstractText>")
});
static LABEL_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"Label\s*=\s*"([^"]+)""#));

/// Extracts abstracts from an efetch XML payload, keyed by identifier.
///
/// Structured abstracts keep their section labels (`BACKGROUND: ...`), one
/// section per line. Articles without an abstract are absent.
#[must_use]
pub fn parse_efetch_abstracts(xml: &str) -> HashMap<String, String> {
    let mut abstracts = HashMap::new();

    for block in ARTICLE_BLOCK_RE.find_iter(xml) {
        let block = block.as_str();
        let Some(pmid) = PMID_RE
            .captures(block)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };

        let sections: Vec<String> = ABSTRACT_TEXT_RE
            .captures_iter(block)
            .filter_map(|caps| {
                let text = decode_html_entities(&strip_markup(caps.get(2)?.as_str()));
                if text.is_empty() {
                    return None;
                }
                let label = caps
                    .get(1)
                    .and_then(|attrs| LABEL_ATTR_RE.captures(attrs.as_str()))
                    .and_then(|label| label.get(1))
                    .map(|m| m.as_str().trim().to_string());
                Some(match label {
                    Some(label) if !label.is_empty() => format!("{label}: {text}"),
                    _ => text,
                })
            })
            .collect();

        if !sections.is_empty() {
            abstracts.insert(pmid, sections.join("\n"));
        }
    }

    abstracts
}
