//! Citation templates.

use std::fmt::Write as _;

use crate::upstream::ArticleSummary;

fn journal_name(summary: &ArticleSummary) -> &str {
    summary
        .journal_full
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(&summary.journal)
}

/// RIS record terminated by `ER  - `.
#[must_use]
pub fn render_ris(summary: &ArticleSummary) -> String {
    let mut out = String::new();
    let mut tag = |name: &str, value: &str| {
        if !value.trim().is_empty() {
            let _ = writeln!(out, "{name}  - {}", value.trim());
        }
    };

    tag("TY", "JOUR");
    tag("TI", &summary.title);
    for author in &summary.authors {
        tag("AU", author);
    }
    tag("JO", journal_name(summary));
    tag("PY", summary.year.as_deref().unwrap_or_default());
    tag("DA", &summary.pub_date);
    tag("VL", summary.volume.as_deref().unwrap_or_default());
    tag("IS", summary.issue.as_deref().unwrap_or_default());
    tag("SP", summary.pages.as_deref().unwrap_or_default());
    tag("DO", summary.doi.as_deref().unwrap_or_default());
    tag("AN", &summary.pmid);
    tag("UR", &summary.url);
    tag("AB", summary.abstract_text.as_deref().unwrap_or_default());
    out.push_str("ER  - \n");
    out
}

/// BibTeX `@article` entry keyed `pmid<id>`.
#[must_use]
pub fn render_bibtex(summary: &ArticleSummary) -> String {
    let mut fields: Vec<(&str, String)> = vec![("title", summary.title.clone())];
    if !summary.authors.is_empty() {
        fields.push(("author", summary.authors.join(" and ")));
    }
    let journal = journal_name(summary);
    if !journal.is_empty() {
        fields.push(("journal", journal.to_string()));
    }
    let optional = [
        ("year", &summary.year),
        ("volume", &summary.volume),
        ("number", &summary.issue),
        ("pages", &summary.pages),
        ("doi", &summary.doi),
    ];
    for (name, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            fields.push((name, value.to_string()));
        }
    }
    fields.push(("pmid", summary.pmid.clone()));
    if !summary.url.is_empty() {
        fields.push(("url", summary.url.clone()));
    }

    let mut out = format!("@article{{pmid{},\n", summary.pmid);
    let last = fields.len() - 1;
    for (i, (name, value)) in fields.iter().enumerate() {
        let sep = if i == last { "" } else { "," };
        let _ = writeln!(out, "  {name} = {{{}}}{sep}", escape_bibtex(value));
    }
    out.push_str("}\n");
    out
}

// Unbalanced braces would end the field early.
fn escape_bibtex(value: &str) -> String {
    value.replace('{', "\\{").replace('}', "\\}")
}

/// `Authors. Title. Journal. Year;Volume(Issue):Pages. doi:DOI. PMID: id.`
#[must_use]
pub fn render_plain(summary: &ArticleSummary) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !summary.authors.is_empty() {
        parts.push(summary.authors.join(", "));
    }
    parts.push(summary.title.trim_end_matches('.').to_string());
    let journal = journal_name(summary);
    if !journal.is_empty() {
        parts.push(journal.to_string());
    }

    let mut issue_line = summary.year.clone().unwrap_or_default();
    if let Some(volume) = &summary.volume {
        let _ = write!(issue_line, ";{volume}");
        if let Some(issue) = &summary.issue {
            let _ = write!(issue_line, "({issue})");
        }
    }
    if let Some(pages) = &summary.pages {
        let _ = write!(issue_line, ":{pages}");
    }
    if !issue_line.is_empty() {
        parts.push(issue_line);
    }
    if let Some(doi) = &summary.doi {
        parts.push(format!("doi:{doi}"));
    }
    parts.push(format!("PMID: {}", summary.pmid));

    let mut out = parts.join(". ");
    out.push_str(".\n");
    out
}
