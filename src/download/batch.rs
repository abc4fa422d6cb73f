//! Sequential, paced batch downloads.
//!
//! Items run strictly one at a time in caller order. Each attempt is preceded
//! by a pre-download delay, and successive attempts are separated by an
//! inter-item delay; both come from a [`PacingPolicy`]. One item's failure
//! never stops the rest. Cancellation stops the batch and marks the
//! remaining items cancelled.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::resolver::OpenAccessInfo;

use super::DownloadError;
use super::constants::MAX_BATCH_SIZE;
use super::orchestrator::{DownloadOrchestrator, DownloadReport, DownloadRequest, saved_copy};
use super::pacing::{PacingPolicy, pause};

/// Per-item outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItemOutcome {
    /// Saved (or already present).
    Saved {
        /// Download details.
        report: DownloadReport,
    },
    /// The attempt failed.
    Failed {
        /// Human-readable reason including tool diagnostics.
        error: String,
        /// Whether a later attempt could succeed.
        retryable: bool,
    },
    /// Not attempted.
    Skipped {
        /// Why.
        reason: String,
    },
    /// Not attempted because the batch was cancelled.
    Cancelled,
}

/// One row of a batch report.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    /// Entity identifier.
    pub id: String,
    /// Outcome.
    #[serde(flatten)]
    pub outcome: BatchItemOutcome,
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Items in caller order.
    pub items: Vec<BatchItemResult>,
    /// Saved count.
    pub saved: usize,
    /// Failed count.
    pub failed: usize,
    /// Skipped count.
    pub skipped: usize,
    /// Cancelled count.
    pub cancelled: usize,
}

impl BatchReport {
    fn push(&mut self, id: &str, outcome: BatchItemOutcome) -> &BatchItemResult {
        match &outcome {
            BatchItemOutcome::Saved { .. } => self.saved += 1,
            BatchItemOutcome::Failed { .. } => self.failed += 1,
            BatchItemOutcome::Skipped { .. } => self.skipped += 1,
            BatchItemOutcome::Cancelled => self.cancelled += 1,
        }
        self.items.push(BatchItemResult {
            id: id.to_string(),
            outcome,
        });
        &self.items[self.items.len() - 1]
    }
}

/// Runs [`DownloadOrchestrator`] over a list of resolved entities.
pub struct BatchDownloadScheduler {
    orchestrator: Arc<DownloadOrchestrator>,
    pacing: Arc<dyn PacingPolicy>,
    max_items: usize,
}

impl BatchDownloadScheduler {
    /// Creates a scheduler with the standard item cap.
    #[must_use]
    pub fn new(orchestrator: Arc<DownloadOrchestrator>, pacing: Arc<dyn PacingPolicy>) -> Self {
        Self {
            orchestrator,
            pacing,
            max_items: MAX_BATCH_SIZE,
        }
    }

    /// Item cap.
    #[must_use]
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Downloads every open-access item in order.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::BatchTooLarge`] when `items` exceeds the cap;
    /// per-item failures are reported inside the [`BatchReport`].
    pub async fn run(
        &self,
        items: &[OpenAccessInfo],
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, DownloadError> {
        self.run_with_observer(items, force, cancel, |_, _| {}).await
    }

    /// Like [`Self::run`], calling `observe(position, result)` after each item.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::BatchTooLarge`] when `items` exceeds the cap.
    #[instrument(skip_all, fields(items = items.len(), force))]
    pub async fn run_with_observer<F>(
        &self,
        items: &[OpenAccessInfo],
        force: bool,
        cancel: &CancellationToken,
        mut observe: F,
    ) -> Result<BatchReport, DownloadError>
    where
        F: FnMut(usize, &BatchItemResult) + Send,
    {
        if items.len() > self.max_items {
            return Err(DownloadError::BatchTooLarge {
                requested: items.len(),
                max: self.max_items,
            });
        }

        let mut report = BatchReport::default();
        let mut attempted = 0usize;

        for (position, info) in items.iter().enumerate() {
            let outcome = if cancel.is_cancelled() {
                BatchItemOutcome::Cancelled
            } else if let Some(report) = self.already_saved(info.id(), force).await {
                // No pacing: nothing goes over the network.
                debug!(id = info.id(), "already downloaded; not paced");
                BatchItemOutcome::Saved { report }
            } else if let (true, Some(url)) = (info.is_open_access(), info.download_url()) {
                let outcome = self.attempt(info, url, attempted, force, cancel).await;
                if !matches!(outcome, BatchItemOutcome::Cancelled) {
                    attempted += 1;
                }
                outcome
            } else {
                debug!(id = info.id(), "skipping item without open-access copy");
                BatchItemOutcome::Skipped {
                    reason: "no open-access copy available".to_string(),
                }
            };

            let result = report.push(info.id(), outcome);
            observe(position, result);
        }

        info!(
            saved = report.saved,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "batch download finished"
        );
        Ok(report)
    }

    async fn already_saved(&self, id: &str, force: bool) -> Option<DownloadReport> {
        if force {
            return None;
        }
        saved_copy(self.orchestrator.ledger(), id).await
    }

    async fn attempt(
        &self,
        info: &OpenAccessInfo,
        url: &str,
        attempted: usize,
        force: bool,
        cancel: &CancellationToken,
    ) -> BatchItemOutcome {
        if attempted > 0 {
            let gap = self.pacing.inter_item_delay(attempted);
            debug!(delay_ms = gap.as_millis(), "inter-item pacing");
            if !pause(gap, cancel).await {
                return BatchItemOutcome::Cancelled;
            }
        }
        let lead = self.pacing.pre_download_delay(attempted);
        debug!(delay_ms = lead.as_millis(), "pre-download pacing");
        if !pause(lead, cancel).await {
            return BatchItemOutcome::Cancelled;
        }

        let request = DownloadRequest::new(info.id(), url)
            .with_sources(info.sources().to_vec())
            .with_force(force);
        match self.orchestrator.download(&request, cancel).await {
            Ok(report) => BatchItemOutcome::Saved { report },
            Err(DownloadError::Cancelled { .. }) => BatchItemOutcome::Cancelled,
            Err(error) => {
                warn!(id = info.id(), error = %error, "batch item failed; continuing");
                BatchItemOutcome::Failed {
                    retryable: error.is_retryable(),
                    error: error.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for BatchDownloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDownloadScheduler")
            .field("max_items", &self.max_items)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::test_support::download_fakes::{FakeBehavior, FakeDownloader, orchestrator};
    use crate::download::pacing::{NoPacing, RandomPacing};
    use crate::resolver::{ResolveTarget, SourceHit};

    fn open(id: &str) -> OpenAccessInfo {
        OpenAccessInfo::available(
            &ResolveTarget::new(id),
            "pmc",
            SourceHit::new(format!("https://oa.example/{id}.pdf")),
        )
    }

    fn closed(id: &str) -> OpenAccessInfo {
        OpenAccessInfo::unavailable(&ResolveTarget::new(id))
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_open_access_items_are_attempted_with_paced_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(8)));
        let orch = Arc::new(orchestrator(dir.path(), fake.clone(), None, 1_000));
        let pacing = Arc::new(RandomPacing::seeded(3));
        let min_gap = pacing.min_inter_item_delay();
        let scheduler = BatchDownloadScheduler::new(orch, pacing);

        let mut attempt_times = Vec::new();
        let report = scheduler
            .run_with_observer(
                &[open("1"), closed("2"), open("3")],
                false,
                &CancellationToken::new(),
                |_, result| {
                    if matches!(result.outcome, BatchItemOutcome::Saved { .. }) {
                        attempt_times.push(Instant::now());
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(report.saved, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            report.items[1].outcome,
            BatchItemOutcome::Skipped { .. }
        ));
        assert_eq!(attempt_times.len(), 2);
        assert!(attempt_times[1] - attempt_times[0] >= min_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_items_are_neither_paced_nor_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(8)));
        let orch = Arc::new(orchestrator(dir.path(), fake.clone(), None, 1_000));
        orch.download(
            &DownloadRequest::new("1", "https://oa.example/1.pdf"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let scheduler = BatchDownloadScheduler::new(orch, Arc::new(RandomPacing::seeded(5)));

        let started = Instant::now();
        let report = scheduler
            .run(&[open("1")], false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.saved, 1);
        assert!(matches!(
            &report.items[0].outcome,
            BatchItemOutcome::Saved { report } if report.cached
        ));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::ExitNonZero));
        let orch = Arc::new(orchestrator(dir.path(), fake.clone(), None, 1_000));
        let scheduler = BatchDownloadScheduler::new(orch, Arc::new(NoPacing));

        let report = scheduler
            .run(&[open("1"), open("2")], false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(1)));
        let orch = Arc::new(orchestrator(dir.path(), fake, None, 1_000));
        let scheduler = BatchDownloadScheduler::new(orch, Arc::new(NoPacing));

        let items: Vec<_> = (0..11).map(|i| open(&i.to_string())).collect();
        let err = scheduler
            .run(&items, false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DownloadError::BatchTooLarge {
                requested: 11,
                max: 10
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_marks_remaining_items() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeDownloader::new(FakeBehavior::Write(1)));
        let orch = Arc::new(orchestrator(dir.path(), fake.clone(), None, 1_000));
        let scheduler = BatchDownloadScheduler::new(orch, Arc::new(RandomPacing::seeded(1)));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            // After the first item's lead-in (at most 3 s) but before the
            // second item's gap (at least 2 s more) has elapsed.
            tokio::time::sleep(Duration::from_millis(3_500)).await;
            trigger.cancel();
        });

        let report = scheduler
            .run(&[open("1"), open("2"), open("3")], false, &cancel)
            .await
            .unwrap();
        assert_eq!(report.saved, 1);
        assert_eq!(report.cancelled, 2);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }
}
