//! Full-text retrieval through external download tools.
//!
//! # Architecture
//!
//! - [`Downloader`] - Retrieval capability; [`CommandDownloader`] drives curl, wget, or PowerShell
//! - [`ContentLengthProbe`] - Size check run before any bytes are written
//! - [`DownloadOrchestrator`] - Single download state machine with ledger bookkeeping
//! - [`BatchDownloadScheduler`] - Sequential, paced batch runner
//! - [`PacingPolicy`] - Injectable delay policy ([`RandomPacing`], [`NoPacing`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use litgate_core::download::{
//!     DownloadOrchestrator, DownloadRequest, HttpHeadProbe, MAX_DOWNLOAD_BYTES, Platform,
//!     select_downloader, FULLTEXT_TTL,
//! };
//! use litgate_core::cache::Ledger;
//! use litgate_core::clock::SystemClock;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = Arc::new(SystemClock);
//! let orchestrator = DownloadOrchestrator::new(
//!     select_downloader(Platform::detect()).await?,
//!     Arc::new(HttpHeadProbe::new()?),
//!     Arc::new(Ledger::new("./fulltext", FULLTEXT_TTL, clock.clone())),
//!     clock,
//!     MAX_DOWNLOAD_BYTES,
//! );
//! let report = orchestrator
//!     .download(
//!         &DownloadRequest::new("31452104", "https://example.org/paper.pdf"),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("saved {}", report.path.display());
//! # Ok(())
//! # }
//! ```

mod batch;
mod constants;
mod error;
mod orchestrator;
pub mod pacing;
mod probe;
mod tools;

pub use batch::{BatchDownloadScheduler, BatchItemOutcome, BatchItemResult, BatchReport};
pub use constants::{FULLTEXT_TTL, MAX_BATCH_SIZE, MAX_DOWNLOAD_BYTES};
pub use error::DownloadError;
pub use orchestrator::{
    DownloadOrchestrator, DownloadRecord, DownloadReport, DownloadRequest, DownloadState,
    saved_copy,
};
pub use pacing::{NoPacing, PacingPolicy, RandomPacing};
pub use probe::{ContentLengthProbe, HttpHeadProbe};
pub use tools::{
    CommandDownloader, Downloader, FetchOutcome, FetchRequest, Platform, ToolKind,
    select_downloader,
};
