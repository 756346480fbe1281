//! Durable fetch cache and crash-recovery journal for Capstan.
//!
//! This crate provides the two-tier cache: `FetchCache` is the in-memory
//! fingerprint → entry map consulted during a run, `RecoveryJournal` writes
//! one small record file per fingerprint eagerly so resolved hashes survive
//! a crash, `DurableFile` is the aggregated cache persisted at the end of a
//! successful run, and `CacheLifecycle` loads and reconciles the two tiers.

pub mod cache;
pub mod durable;
pub mod journal;
pub mod layout;
pub mod lifecycle;
pub mod record;

pub use cache::FetchCache;
pub use durable::DurableFile;
pub use journal::RecoveryJournal;
pub use layout::CacheLayout;
pub use lifecycle::{CacheLifecycle, CacheLock};
pub use record::{decode_record, encode_record, CacheEntry, RecordError, RECORD_SEPARATOR};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
/// Calling `fsync()` on the parent directory makes the rename durable on
/// all filesystems and mount configurations.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("oracle error: {0}")]
    Oracle(#[from] capstan_oracle::OracleError),
    #[error("cache lock: {0}")]
    LockFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_error_display_lock_failed() {
        let e = CacheError::LockFailed("held elsewhere".to_owned());
        assert!(e.to_string().contains("held elsewhere"));
    }

    #[test]
    fn cache_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = CacheError::from(io);
        assert!(e.to_string().contains("gone"));
    }
}
