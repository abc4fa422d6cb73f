//! File-backed per-identifier metadata cache with a long TTL.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::clock::{Clock, is_expired};
use crate::upstream::ArticleSummary;

use super::ledger::{CleanupReport, Ledger, LedgerEntry, LedgerStats, write_atomic};
use super::{CacheError, safe_file_stem};

/// Default lifetime of a cached record.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Record file format version.
pub const RECORD_FORMAT_VERSION: u32 = 1;

/// One cached entity as written to `records/<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentRecord {
    /// Format version.
    pub version: u32,
    /// Entity identifier.
    pub id: String,
    /// Capture time (Unix ms).
    pub captured_at: u64,
    /// Cached metadata.
    pub payload: ArticleSummary,
}

/// Ledger entry for the record tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    /// Capture time (Unix ms).
    pub captured_at: u64,
    /// Record file size.
    pub size_bytes: u64,
    /// File name inside the tier directory.
    pub file: String,
}

impl LedgerEntry for RecordEntry {
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

/// Record-tier counters plus ledger aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordStoreStats {
    /// Reads served from disk.
    pub hits: u64,
    /// Reads that found nothing usable.
    pub misses: u64,
    /// Records written.
    pub writes: u64,
    /// Records deleted on read because they outlived the TTL.
    pub expired: u64,
    /// I/O or decode failures absorbed as misses.
    pub errors: u64,
    /// Ledger aggregates.
    pub ledger: LedgerStats,
}

/// Persistent metadata tier.
///
/// Read and write failures are logged and reported as misses; callers always
/// fall back to the upstream.
#[derive(Debug)]
pub struct PersistentRecordStore {
    ledger: Ledger<RecordEntry>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    expired: AtomicU64,
    errors: AtomicU64,
}

impl PersistentRecordStore {
    /// Creates a store rooted at `dir` (normally `<cache>/records`).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: Ledger::new(dir, ttl, Arc::clone(&clock)),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.ledger.dir().join(record_file_name(id))
    }

    /// Returns the cached payload for `id`, or `None` on miss.
    ///
    /// A record older than the TTL is deleted and reported as a miss.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Option<ArticleSummary> {
        let path = self.record_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return self.miss(),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "record read failed; treating as miss"
                );
                self.errors.fetch_add(1, Ordering::Relaxed);
                return self.miss();
            }
        };

        let record = match serde_json::from_slice::<PersistentRecord>(&bytes) {
            Ok(record) if record.version == RECORD_FORMAT_VERSION && record.id == id => record,
            Ok(_) => {
                debug!(path = %path.display(), "record version or identity mismatch; discarding");
                self.discard(id, &path).await;
                return self.miss();
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "record is corrupt; discarding");
                self.errors.fetch_add(1, Ordering::Relaxed);
                self.discard(id, &path).await;
                return self.miss();
            }
        };

        if is_expired(record.captured_at, self.clock.now_millis(), self.ledger.ttl()) {
            debug!("record expired; deleting");
            self.expired.fetch_add(1, Ordering::Relaxed);
            self.discard(id, &path).await;
            return self.miss();
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(record.payload)
    }

    /// Writes `payload` for `id` and upserts the ledger. Failures are logged only.
    #[instrument(skip(self, payload))]
    pub async fn set(&self, id: &str, payload: &ArticleSummary) {
        if let Err(error) = self.try_set(id, payload).await {
            warn!(error = %error, "record write failed; continuing without persistence");
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn try_set(&self, id: &str, payload: &ArticleSummary) -> Result<(), CacheError> {
        let captured_at = self.clock.now_millis();
        let record = PersistentRecord {
            version: RECORD_FORMAT_VERSION,
            id: id.to_string(),
            captured_at,
            payload: payload.clone(),
        };
        let path = self.record_path(id);
        let bytes = serde_json::to_vec(&record).map_err(|e| CacheError::serde(&path, e))?;
        let size_bytes = bytes.len() as u64;

        let dir = self.ledger.dir().to_path_buf();
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
            write_atomic(&target, &bytes)
        })
        .await??;

        self.ledger
            .upsert(
                id,
                RecordEntry {
                    captured_at,
                    size_bytes,
                    file: record_file_name(id),
                },
            )
            .await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Deletes expired records and heals the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the ledger cannot be rewritten.
    pub async fn clean_expired(&self) -> Result<CleanupReport, CacheError> {
        self.ledger.clean_expired().await
    }

    /// Deletes every record.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the ledger cannot be rewritten.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        self.ledger.clear().await
    }

    /// Counter snapshot, reconciling the ledger against disk first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the ledger cannot be read or rewritten.
    pub async fn stats(&self) -> Result<RecordStoreStats, CacheError> {
        let ledger = self.ledger.reconcile().await?;
        Ok(RecordStoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            ledger,
        })
    }

    fn miss(&self) -> Option<ArticleSummary> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn discard(&self, id: &str, path: &std::path::Path) {
        if let Err(error) = tokio::fs::remove_file(path).await
            && error.kind() != ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %error, "failed to delete record file");
        }
        if let Err(error) = self.ledger.remove(id).await {
            warn!(error = %error, "failed to drop record from ledger");
        }
    }
}

fn record_file_name(id: &str) -> String {
    format!("{}.json", safe_file_stem(id))
}
