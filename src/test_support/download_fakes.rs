//! In-process stand-ins for the retrieval tool and the size probe.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::Ledger;
use crate::clock::ManualClock;
use crate::download::{
    ContentLengthProbe, DownloadError, DownloadOrchestrator, Downloader, FULLTEXT_TTL,
    FetchOutcome, FetchRequest,
};

/// What the fake tool does when run.
#[derive(Clone, Copy)]
pub(crate) enum FakeBehavior {
    Write(usize),
    WriteNothing,
    ExitNonZero,
}

pub(crate) struct FakeDownloader {
    pub behavior: FakeBehavior,
    pub calls: AtomicUsize,
}

impl FakeDownloader {
    pub(crate) fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }
}

fn exited_ok() -> FetchOutcome {
    FetchOutcome {
        success: true,
        exit_code: Some(0),
        diagnostic: String::new(),
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch(
        &self,
        _id: &str,
        request: &FetchRequest,
        _cancel: &CancellationToken,
    ) -> Result<FetchOutcome, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            FakeBehavior::Write(bytes) => {
                tokio::fs::write(&request.destination, vec![b'%'; bytes])
                    .await
                    .unwrap();
                Ok(exited_ok())
            }
            FakeBehavior::WriteNothing => {
                tokio::fs::write(&request.destination, b"").await.unwrap();
                Ok(exited_ok())
            }
            FakeBehavior::ExitNonZero => Ok(FetchOutcome {
                success: false,
                exit_code: Some(22),
                diagnostic: "The requested URL returned error: 404".into(),
            }),
        }
    }
}

/// Reports a fixed advertised length.
pub(crate) struct FixedProbe(pub Option<u64>);

#[async_trait]
impl ContentLengthProbe for FixedProbe {
    async fn content_length(
        &self,
        _id: &str,
        _url: &str,
        _cancel: &CancellationToken,
    ) -> Result<Option<u64>, DownloadError> {
        Ok(self.0)
    }
}

/// Orchestrator over `dir/fulltext` driven by `downloader`.
pub(crate) fn orchestrator(
    dir: &Path,
    downloader: Arc<FakeDownloader>,
    advertised: Option<u64>,
    max_bytes: u64,
) -> DownloadOrchestrator {
    let clock = Arc::new(ManualClock::new(5_000));
    let ledger = Arc::new(Ledger::new(dir.join("fulltext"), FULLTEXT_TTL, clock.clone()));
    DownloadOrchestrator::new(
        downloader,
        Arc::new(FixedProbe(advertised)),
        ledger,
        clock,
        max_bytes,
    )
}
