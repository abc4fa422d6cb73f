//! Progress bar for batch downloads.

use indicatif::{ProgressBar, ProgressStyle};
use litgate_core::download::{BatchItemOutcome, BatchItemResult};

/// Creates a bar over `total` items, or a hidden one when progress is off.
pub(crate) fn batch_bar(enabled: bool, total: usize) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message("resolving open-access copies...");
    bar
}

/// Advances the bar after one item finishes.
pub(crate) fn record(bar: &ProgressBar, result: &BatchItemResult) {
    bar.inc(1);
    bar.set_message(format!("{} {}", result.id, outcome_label(&result.outcome)));
}

fn outcome_label(outcome: &BatchItemOutcome) -> &'static str {
    match outcome {
        BatchItemOutcome::Saved { report } if report.cached => "already saved",
        BatchItemOutcome::Saved { .. } => "saved",
        BatchItemOutcome::Failed { .. } => "failed",
        BatchItemOutcome::Skipped { .. } => "skipped",
        BatchItemOutcome::Cancelled => "cancelled",
    }
}
