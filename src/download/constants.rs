//! Constants for the download module (timeouts, size cap, pacing bounds).

use std::time::Duration;

/// Connection timeout handed to the retrieval tool.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Overall transfer timeout handed to the retrieval tool.
pub const MAX_TRANSFER_TIME: Duration = Duration::from_secs(120);

/// Extra time allowed past [`MAX_TRANSFER_TIME`] before the process is killed.
pub const PROCESS_GRACE: Duration = Duration::from_secs(10);

/// Timeout for the size probe and tool availability checks.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest document accepted (50 MiB).
pub const MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Maximum entities in one batch.
pub const MAX_BATCH_SIZE: usize = 10;

/// Lifetime of a downloaded document in the full-text tier.
pub const FULLTEXT_TTL: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Pre-download jitter bounds, in milliseconds.
pub const PRE_DOWNLOAD_DELAY_MS: (u64, u64) = (1_000, 3_000);

/// Inter-item jitter bounds, in milliseconds.
pub const INTER_ITEM_DELAY_MS: (u64, u64) = (2_000, 5_000);

/// Diagnostic output kept from a failed tool run.
pub const MAX_DIAGNOSTIC_CHARS: usize = 2_000;
