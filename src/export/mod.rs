//! Citation export tier.
//!
//! Renders fetched metadata as RIS, BibTeX, or a plain-text reference and
//! caches each rendering as `exports/<id>.<ext>` with its own ledger.

mod render;

pub use render::{render_bibtex, render_plain, render_ris};

use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cache::ledger::write_atomic;
use crate::cache::{CacheError, Ledger, LedgerEntry, safe_file_stem};
use crate::clock::{Clock, is_expired};
use crate::upstream::ArticleSummary;

/// Lifetime of a cached export.
pub const EXPORT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Supported citation formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// RIS tagged format.
    #[default]
    Ris,
    /// BibTeX `@article` entry.
    Bibtex,
    /// One-line plain-text reference.
    Plain,
}

impl ExportFormat {
    /// File extension used in the export tier.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Ris => "ris",
            Self::Bibtex => "bib",
            Self::Plain => "txt",
        }
    }

    fn render(self, summary: &ArticleSummary) -> String {
        match self {
            Self::Ris => render_ris(summary),
            Self::Bibtex => render_bibtex(summary),
            Self::Plain => render_plain(summary),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ris => "ris",
            Self::Bibtex => "bibtex",
            Self::Plain => "plain",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ris" => Ok(Self::Ris),
            "bibtex" | "bib" => Ok(Self::Bibtex),
            "plain" | "text" | "txt" => Ok(Self::Plain),
            other => Err(format!(
                "unknown export format '{other}' (expected ris, bibtex, plain)"
            )),
        }
    }
}

/// Export-tier failures.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Writing or reading the export file failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Ledger entry for the export tier (keyed by file name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    /// Entity identifier.
    pub id: String,
    /// Format rendered.
    pub format: ExportFormat,
    /// File name inside the tier directory.
    pub file: String,
    /// File size.
    pub size_bytes: u64,
    /// Render time (Unix ms).
    pub captured_at: u64,
}

impl LedgerEntry for ExportEntry {
    fn captured_at(&self) -> u64 {
        self.captured_at
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    fn payload_file(&self) -> &str {
        &self.file
    }
}

/// One rendered citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedCitation {
    /// Entity identifier.
    pub id: String,
    /// Format.
    pub format: ExportFormat,
    /// Rendered text.
    pub content: String,
    /// Where it is cached.
    pub path: PathBuf,
    /// True when read back from the tier instead of rendered.
    pub cached: bool,
}

/// Export tier over a ledger directory.
#[derive(Debug)]
pub struct ExportStore {
    ledger: Ledger<ExportEntry>,
    clock: Arc<dyn Clock>,
}

impl ExportStore {
    /// Creates a tier rooted at `dir` (normally `<cache>/exports`).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: Ledger::new(dir, ttl, Arc::clone(&clock)),
            clock,
        }
    }

    /// The tier's ledger.
    #[must_use]
    pub fn ledger(&self) -> &Ledger<ExportEntry> {
        &self.ledger
    }

    /// Returns the cached rendering or renders and caches a new one.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] when a fresh rendering cannot be written.
    #[instrument(skip(self, summary), fields(id = %summary.pmid, %format))]
    pub async fn export(
        &self,
        summary: &ArticleSummary,
        format: ExportFormat,
    ) -> Result<ExportedCitation, ExportError> {
        let file = format!("{}.{}", safe_file_stem(&summary.pmid), format.extension());
        let path = self.ledger.dir().join(&file);

        if let Some(content) = self.read_cached(&file, &path).await {
            debug!("export served from tier");
            return Ok(ExportedCitation {
                id: summary.pmid.clone(),
                format,
                content,
                path,
                cached: true,
            });
        }

        let content = format.render(summary);
        let dir = self.ledger.dir().to_path_buf();
        let target = path.clone();
        let bytes = content.clone().into_bytes();
        let size_bytes = bytes.len() as u64;
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
            write_atomic(&target, &bytes)
        })
        .await
        .map_err(CacheError::from)??;

        self.ledger
            .upsert(
                &file,
                ExportEntry {
                    id: summary.pmid.clone(),
                    format,
                    file: file.clone(),
                    size_bytes,
                    captured_at: self.clock.now_millis(),
                },
            )
            .await?;

        Ok(ExportedCitation {
            id: summary.pmid.clone(),
            format,
            content,
            path,
            cached: false,
        })
    }

    async fn read_cached(&self, key: &str, path: &std::path::Path) -> Option<String> {
        let entry = match self.ledger.get(key).await {
            Ok(entry) => entry?,
            Err(error) => {
                warn!(error = %error, "export ledger unreadable; rendering again");
                return None;
            }
        };
        if is_expired(entry.captured_at, self.clock.now_millis(), self.ledger.ttl()) {
            return None;
        }
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Some(content),
            Err(error) if error.kind() == ErrorKind::NotFound => None,
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "export file unreadable; rendering again"
                );
                None
            }
        }
    }
}
