//! Durable per-tier index of cached entities.
//!
//! Each tier directory holds an `index.json` ledger plus one payload file per
//! identifier. Mutations are serialized in-process by an async mutex and
//! across processes by an advisory lock on `index.lock`; the new ledger is
//! written to a temp file and renamed over the old one, so readers never see
//! a torn file.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clock::{Clock, is_expired};

use super::CacheError;

/// Ledger format version written by this build.
pub const LEDGER_FORMAT_VERSION: u32 = 1;

const LEDGER_FILE: &str = "index.json";
const LOCK_FILE: &str = "index.lock";

/// Per-entity ledger metadata.
pub trait LedgerEntry: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// When the payload was captured (Unix ms).
    fn captured_at(&self) -> u64;

    /// Payload size in bytes.
    fn size_bytes(&self) -> u64;

    /// Payload file name relative to the tier directory.
    fn payload_file(&self) -> &str;
}

/// Aggregate counters stored alongside the entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Number of entries.
    pub total_entries: usize,
    /// Sum of payload sizes.
    pub total_bytes: u64,
    /// Last `clean_expired` run (Unix ms).
    pub last_cleanup: Option<u64>,
}

/// On-disk ledger document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "E: LedgerEntry")]
pub struct LedgerFile<E> {
    /// Format version.
    pub version: u32,
    /// When this ledger was first created (Unix ms).
    pub created_at: u64,
    /// Entries keyed by identifier.
    pub entries: BTreeMap<String, E>,
    /// Aggregate counters.
    pub stats: LedgerStats,
}

impl<E: LedgerEntry> LedgerFile<E> {
    fn empty(now_ms: u64) -> Self {
        Self {
            version: LEDGER_FORMAT_VERSION,
            created_at: now_ms,
            entries: BTreeMap::new(),
            stats: LedgerStats::default(),
        }
    }

    fn recompute_stats(&mut self) {
        self.stats.total_entries = self.entries.len();
        self.stats.total_bytes = self.entries.values().map(LedgerEntry::size_bytes).sum();
    }
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Entries removed because they outlived the TTL.
    pub expired: usize,
    /// Entries removed because their payload file was gone.
    pub missing: usize,
    /// Entries left.
    pub remaining: usize,
}

/// Handle to one tier's ledger.
pub struct Ledger<E> {
    dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    write_guard: Mutex<()>,
    _entry: std::marker::PhantomData<fn() -> E>,
}

impl<E: LedgerEntry> Ledger<E> {
    /// Opens (lazily) the ledger stored in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            clock,
            write_guard: Mutex::new(()),
            _entry: std::marker::PhantomData,
        }
    }

    /// Tier directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entry lifetime for this tier.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Absolute path of an entry's payload.
    #[must_use]
    pub fn payload_path(&self, entry: &E) -> PathBuf {
        self.dir.join(entry.payload_file())
    }

    /// Reads the current ledger. A missing ledger reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the file exists but cannot be read.
    pub async fn snapshot(&self) -> Result<LedgerFile<E>, CacheError> {
        let dir = self.dir.clone();
        let now = self.clock.now_millis();
        tokio::task::spawn_blocking(move || read_ledger(&dir, now)).await?
    }

    /// Looks up one entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the ledger cannot be read.
    pub async fn get(&self, id: &str) -> Result<Option<E>, CacheError> {
        Ok(self.snapshot().await?.entries.remove(id))
    }

    /// Inserts or replaces an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the ledger cannot be rewritten.
    pub async fn upsert(&self, id: &str, entry: E) -> Result<(), CacheError> {
        let id = id.to_string();
        self.update(move |ledger, _| {
            ledger.entries.insert(id, entry);
        })
        .await
    }

    /// Removes an entry, returning it if present. The payload file is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the ledger cannot be rewritten.
    pub async fn remove(&self, id: &str) -> Result<Option<E>, CacheError> {
        let id = id.to_string();
        self.update(move |ledger, _| ledger.entries.remove(&id)).await
    }

    /// Deletes expired payloads and drops entries whose payload is missing.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the ledger cannot be rewritten.
    pub async fn clean_expired(&self) -> Result<CleanupReport, CacheError> {
        let ttl = self.ttl;
        let report = self
            .update(move |ledger, ctx| {
                let mut report = CleanupReport::default();
                ledger.entries.retain(|id, entry| {
                    let path = ctx.dir.join(entry.payload_file());
                    if !path.exists() {
                        debug!(id, "dropping ledger entry with missing payload");
                        report.missing += 1;
                        return false;
                    }
                    if is_expired(entry.captured_at(), ctx.now_ms, ttl) {
                        remove_file_logged(&path);
                        report.expired += 1;
                        return false;
                    }
                    true
                });
                ledger.stats.last_cleanup = Some(ctx.now_ms);
                report.remaining = ledger.entries.len();
                report
            })
            .await?;
        debug!(
            dir = %self.dir.display(),
            expired = report.expired,
            missing = report.missing,
            "ledger cleanup complete"
        );
        Ok(report)
    }

    /// Drops entries whose payload is missing and returns fresh stats.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the ledger cannot be rewritten.
    pub async fn reconcile(&self) -> Result<LedgerStats, CacheError> {
        self.update(|ledger, ctx| {
            ledger
                .entries
                .retain(|_, entry| ctx.dir.join(entry.payload_file()).exists());
            ledger.recompute_stats();
            ledger.stats
        })
        .await
    }

    /// Deletes every payload and resets the ledger. Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the ledger cannot be rewritten.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        self.update(|ledger, ctx| {
            let removed = ledger.entries.len();
            for entry in ledger.entries.values() {
                remove_file_logged(&ctx.dir.join(entry.payload_file()));
            }
            ledger.entries.clear();
            ledger.stats.last_cleanup = Some(ctx.now_ms);
            removed
        })
        .await
    }

    async fn update<F, R>(&self, mutate: F) -> Result<R, CacheError>
    where
        F: FnOnce(&mut LedgerFile<E>, &UpdateContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let _guard = self.write_guard.lock().await;
        let ctx = UpdateContext {
            dir: self.dir.clone(),
            now_ms: self.clock.now_millis(),
        };
        tokio::task::spawn_blocking(move || locked_update(&ctx, mutate)).await?
    }
}

impl<E> std::fmt::Debug for Ledger<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

struct UpdateContext {
    dir: PathBuf,
    now_ms: u64,
}

fn locked_update<E, F, R>(ctx: &UpdateContext, mutate: F) -> Result<R, CacheError>
where
    E: LedgerEntry,
    F: FnOnce(&mut LedgerFile<E>, &UpdateContext) -> R,
{
    fs::create_dir_all(&ctx.dir).map_err(|e| CacheError::io(&ctx.dir, e))?;

    let lock_path = ctx.dir.join(LOCK_FILE);
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| CacheError::io(&lock_path, e))?;
    lock_file
        .lock_exclusive()
        .map_err(|source| CacheError::Lock {
            path: lock_path.clone(),
            source,
        })?;

    let result = (|| -> Result<R, CacheError> {
        let mut ledger = read_ledger::<E>(&ctx.dir, ctx.now_ms)?;
        let output = mutate(&mut ledger, ctx);
        ledger.recompute_stats();
        write_ledger(&ctx.dir, &ledger)?;
        Ok(output)
    })();

    if let Err(error) = FileExt::unlock(&lock_file) {
        warn!(path = %lock_path.display(), error = %error, "failed to release ledger lock");
    }
    result
}

fn read_ledger<E: LedgerEntry>(dir: &Path, now_ms: u64) -> Result<LedgerFile<E>, CacheError> {
    let path = dir.join(LEDGER_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(LedgerFile::empty(now_ms)),
        Err(error) => return Err(CacheError::io(&path, error)),
    };
    match serde_json::from_slice::<LedgerFile<E>>(&bytes) {
        Ok(ledger) if ledger.version == LEDGER_FORMAT_VERSION => Ok(ledger),
        Ok(ledger) => {
            warn!(
                path = %path.display(),
                version = ledger.version,
                "ledger format version not supported; starting a new ledger"
            );
            Ok(LedgerFile::empty(now_ms))
        }
        Err(error) => {
            warn!(
                path = %path.display(),
                error = %error,
                "ledger is corrupt; starting a new ledger"
            );
            Ok(LedgerFile::empty(now_ms))
        }
    }
}

fn write_ledger<E: LedgerEntry>(dir: &Path, ledger: &LedgerFile<E>) -> Result<(), CacheError> {
    let path = dir.join(LEDGER_FILE);
    let bytes = serde_json::to_vec_pretty(ledger).map_err(|e| CacheError::serde(&path, e))?;
    write_atomic(&path, &bytes)
}

/// Writes `bytes` to a sibling temp file, then renames it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|ext| ext.to_str()).unwrap_or("")
    ));
    {
        let mut file = File::create(&tmp).map_err(|e| CacheError::io(&tmp, e))?;
        std::io::Write::write_all(&mut file, bytes).map_err(|e| CacheError::io(&tmp, e))?;
        file.sync_all().map_err(|e| CacheError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CacheError::io(path, e)
    })
}

fn remove_file_logged(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => {
            warn!(path = %path.display(), error = %error, "failed to delete cached payload");
        }
    }
}
