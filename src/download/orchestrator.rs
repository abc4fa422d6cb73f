//! Single-document download pipeline.
//!
//! ```text
//! Pending -> ProbingSize -> AbortedTooLarge
//!                        -> Fetching -> Failed
//!                                    -> Saved
//! ```
//!
//! `Saved` is recorded in the full-text ledger and short-circuits later calls
//! for the same identifier unless `force` is set. `Failed` leaves no trace.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::{Ledger, LedgerEntry, safe_file_stem};
use crate::clock::Clock;

use super::DownloadError;
use super::probe::ContentLengthProbe;
use super::tools::{Downloader, FetchRequest, partial_path};

/// One downloaded document, as stored in the full-text ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Entity identifier.
    pub id: String,
    /// URL the document was fetched from.
    pub url: String,
    /// Sources that confirmed availability.
    pub sources: Vec<String>,
    /// File path relative to the full-text directory.
    pub file_path: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Capture time (Unix ms).
    pub captured_at: u64,
    /// Tool that fetched it.
    pub tool: String,
}

impl LedgerEntry for DownloadRecord {
    fn captured_at(&self) -> u64 {
        self.captured_at
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    fn payload_file(&self) -> &str {
        &self.file_path
    }
}

/// Download lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// Accepted, nothing done yet.
    Pending,
    /// Checking the advertised size.
    ProbingSize,
    /// Advertised size exceeded the cap; nothing fetched.
    AbortedTooLarge,
    /// The tool is running.
    Fetching,
    /// The tool failed or produced nothing usable.
    Failed,
    /// File written and recorded.
    Saved,
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::ProbingSize => "probing_size",
            Self::AbortedTooLarge => "aborted_too_large",
            Self::Fetching => "fetching",
            Self::Failed => "failed",
            Self::Saved => "saved",
        })
    }
}

/// Input to [`DownloadOrchestrator::download`].
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Entity identifier.
    pub id: String,
    /// Resolved document URL.
    pub url: String,
    /// Sources that confirmed availability.
    pub sources: Vec<String>,
    /// Re-fetch even when a saved copy exists.
    pub force: bool,
}

impl DownloadRequest {
    /// Creates a non-forced request.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            sources: Vec::new(),
            force: false,
        }
    }

    /// Sets the confirming sources.
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    /// Sets the force flag.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Successful download result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Ledger record.
    pub record: DownloadRecord,
    /// Absolute path of the saved file.
    pub path: PathBuf,
    /// True when served from an earlier download.
    pub cached: bool,
}

/// Drives one download through the state machine.
pub struct DownloadOrchestrator {
    downloader: Arc<dyn Downloader>,
    probe: Arc<dyn ContentLengthProbe>,
    ledger: Arc<Ledger<DownloadRecord>>,
    clock: Arc<dyn Clock>,
    max_bytes: u64,
}

impl DownloadOrchestrator {
    /// Creates an orchestrator writing into the ledger's directory.
    #[must_use]
    pub fn new(
        downloader: Arc<dyn Downloader>,
        probe: Arc<dyn ContentLengthProbe>,
        ledger: Arc<Ledger<DownloadRecord>>,
        clock: Arc<dyn Clock>,
        max_bytes: u64,
    ) -> Self {
        Self {
            downloader,
            probe,
            ledger,
            clock,
            max_bytes,
        }
    }

    /// The full-text ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger<DownloadRecord>> {
        &self.ledger
    }

    /// Name of the selected retrieval tool.
    #[must_use]
    pub fn tool_name(&self) -> &'static str {
        self.downloader.name()
    }

    /// Size cap in bytes.
    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn final_path(&self, id: &str) -> PathBuf {
        self.ledger.dir().join(file_name_for(id))
    }

    /// Downloads one document.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::TooLarge`] when the advertised or actual size
    /// exceeds the cap, [`DownloadError::ToolFailed`] / [`DownloadError::EmptyFile`]
    /// when the tool does not produce a usable file, and
    /// [`DownloadError::Cancelled`] when `cancel` fires.
    #[instrument(skip(self, request, cancel), fields(id = %request.id, url = %request.url))]
    pub async fn download(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport, DownloadError> {
        let id = request.id.as_str();
        let mut state = DownloadState::Pending;
        debug!(%state, "download accepted");

        validate_url(&request.url)?;

        if !request.force
            && let Some(report) = self.cached(id).await
        {
            info!(path = %report.path.display(), "already downloaded; skipping fetch");
            return Ok(report);
        }

        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled { id: id.to_string() });
        }

        state = transition(state, DownloadState::ProbingSize);
        if let Some(advertised) = self.probe.content_length(id, &request.url, cancel).await?
            && advertised > self.max_bytes
        {
            transition(state, DownloadState::AbortedTooLarge);
            return Err(DownloadError::TooLarge {
                id: id.to_string(),
                url: request.url.clone(),
                size: advertised,
                limit: self.max_bytes,
            });
        }

        state = transition(state, DownloadState::Fetching);
        match self.fetch(request, cancel).await {
            Ok(report) => {
                transition(state, DownloadState::Saved);
                Ok(report)
            }
            Err(error) => {
                transition(state, DownloadState::Failed);
                Err(error)
            }
        }
    }

    async fn fetch(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport, DownloadError> {
        let id = request.id.as_str();
        let dir = self.ledger.dir();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DownloadError::io(dir, e))?;

        let final_path = self.final_path(id);
        let part_path = partial_path(&final_path);
        remove_if_present(&part_path).await;

        let fetch_request = FetchRequest::new(&request.url, &part_path, self.max_bytes);
        let tool = self.downloader.name();
        let outcome = match self.downloader.fetch(id, &fetch_request, cancel).await {
            Ok(outcome) => outcome,
            Err(error) => {
                remove_if_present(&part_path).await;
                return Err(error);
            }
        };

        if !outcome.success {
            remove_if_present(&part_path).await;
            return Err(DownloadError::ToolFailed {
                id: id.to_string(),
                url: request.url.clone(),
                tool,
                exit_code: outcome.exit_code,
                diagnostic: outcome.diagnostic,
            });
        }

        let size = match tokio::fs::metadata(&part_path).await {
            Ok(meta) => meta.len(),
            Err(error) if error.kind() == ErrorKind::NotFound => 0,
            Err(error) => return Err(DownloadError::io(&part_path, error)),
        };
        if size == 0 {
            remove_if_present(&part_path).await;
            return Err(DownloadError::EmptyFile {
                id: id.to_string(),
                url: request.url.clone(),
                tool,
            });
        }
        if size > self.max_bytes {
            remove_if_present(&part_path).await;
            return Err(DownloadError::TooLarge {
                id: id.to_string(),
                url: request.url.clone(),
                size,
                limit: self.max_bytes,
            });
        }

        tokio::fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| DownloadError::io(&final_path, e))?;

        let record = DownloadRecord {
            id: id.to_string(),
            url: request.url.clone(),
            sources: request.sources.clone(),
            file_path: file_name_for(id),
            size_bytes: size,
            captured_at: self.clock.now_millis(),
            tool: tool.to_string(),
        };
        if let Err(error) = self.ledger.upsert(id, record.clone()).await {
            warn!(error = %error, "saved file but could not record it in the full-text ledger");
        }
        info!(bytes = size, tool, "document saved");

        Ok(DownloadReport {
            record,
            path: final_path,
            cached: false,
        })
    }

    async fn cached(&self, id: &str) -> Option<DownloadReport> {
        saved_copy(&self.ledger, id).await
    }
}

/// An earlier download of `id` whose file is still present and non-empty.
///
/// Needs only the ledger, so callers can check before resolving or picking a tool.
pub async fn saved_copy(ledger: &Ledger<DownloadRecord>, id: &str) -> Option<DownloadReport> {
    let record = match ledger.get(id).await {
        Ok(record) => record?,
        Err(error) => {
            warn!(error = %error, "full-text ledger unreadable; downloading again");
            return None;
        }
    };
    let path = ledger.payload_path(&record);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.len() > 0 => Some(DownloadReport {
            record,
            path,
            cached: true,
        }),
        _ => {
            debug!(path = %path.display(), "ledger entry without file; downloading again");
            None
        }
    }
}

impl fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("tool", &self.downloader.name())
            .field("dir", &self.ledger.dir())
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

fn transition(from: DownloadState, to: DownloadState) -> DownloadState {
    debug!(%from, %to, "download state transition");
    to
}

fn file_name_for(id: &str) -> String {
    format!("{}.pdf", safe_file_stem(id))
}

fn validate_url(url: &str) -> Result<(), DownloadError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(DownloadError::InvalidUrl {
            url: url.to_string(),
        }),
    }
}

async fn remove_if_present(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %error, "failed to remove partial download");
    }
}
