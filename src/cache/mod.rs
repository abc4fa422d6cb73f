//! Two-tier cache hierarchy and the durable per-tier ledgers.
//!
//! # Architecture
//!
//! - [`MemoryCache`] - Bounded, insertion-ordered, short-TTL tier for search results
//! - [`PersistentRecordStore`] - One JSON file per identifier with a long TTL
//! - [`Ledger`] - Locked, atomically rewritten `index.json` shared by every disk tier
//!
//! Disk layout under the cache root:
//!
//! ```text
//! records/index.json   records/<id>.json
//! fulltext/index.json  fulltext/<id>.pdf
//! exports/index.json   exports/<id>.<ext>
//! ```

use sha2::{Digest, Sha256};

mod error;
pub mod ledger;
mod memory;
mod record_store;

pub use error::CacheError;
pub use ledger::{CleanupReport, Ledger, LedgerEntry, LedgerFile, LedgerStats};
pub use memory::{DEFAULT_MEMORY_CAPACITY, DEFAULT_MEMORY_TTL, MemoryCache, MemoryCacheStats};
pub use record_store::{
    DEFAULT_RECORD_TTL, PersistentRecord, PersistentRecordStore, RecordEntry, RecordStoreStats,
};

/// Subdirectory of the record tier.
pub const RECORDS_DIR: &str = "records";
/// Subdirectory of the full-text tier.
pub const FULLTEXT_DIR: &str = "fulltext";
/// Subdirectory of the export tier.
pub const EXPORTS_DIR: &str = "exports";

/// Maps an identifier to a file-name-safe stem.
///
/// Identifiers are usually numeric, but DOIs and PMCIDs may reach a tier too;
/// anything outside `[A-Za-z0-9._-]` becomes `_`. When that rewrites the
/// identifier, a short digest of the original is appended so `a/b` and `a_b`
/// never share a file.
#[must_use]
pub fn safe_file_stem(id: &str) -> String {
    let cleaned: String = id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = match cleaned.trim_start_matches('.') {
        "" => "_",
        stem => stem,
    };
    if stem == id {
        stem.to_string()
    } else {
        format!("{stem}-{}", short_digest(id))
    }
}

fn short_digest(id: &str) -> String {
    Sha256::digest(id.as_bytes())
        .iter()
        .take(4)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
