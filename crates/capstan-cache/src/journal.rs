use crate::record::{decode_record, encode_record, CacheEntry};
use crate::{fsync_dir, CacheError};
use capstan_schema::Fingerprint;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Crash-recovery journal: one record file per fingerprint, written eagerly
/// after every oracle resolution.
///
/// File names are the fixed-length hex digest of the fingerprint, so
/// cooperative concurrent writers never collide on distinct work — a name
/// collision means a duplicate fingerprint, which resolves to identical
/// content by construction. Files are removed once the durable cache has
/// captured their fingerprint.
pub struct RecoveryJournal {
    dir: PathBuf,
}

impl RecoveryJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write (or rewrite) the record for one fingerprint atomically.
    pub fn record(&self, fp: &Fingerprint, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let content = encode_record(fp, entry)? + "\n";
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        let dest = self.dir.join(fp.digest());
        tmp.persist(&dest).map_err(|e| CacheError::Io(e.error))?;
        fsync_dir(&self.dir)?;
        debug!("journaled recovery record {}", dest.display());
        Ok(())
    }

    /// Load every leftover record. Malformed records are skipped with a
    /// warning so one damaged file cannot block startup.
    pub fn load(&self) -> Result<Vec<(Fingerprint, CacheEntry)>, CacheError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Fingerprint digests are 64 hex chars; anything else is not ours
            if name.len() != 64 || !name.chars().all(|c| c.is_ascii_hexdigit()) {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(content) => match decode_record(&content) {
                    Ok(record) => entries.push(record),
                    Err(e) => warn!("skipping corrupt recovery record {}: {e}", path.display()),
                },
                Err(e) => warn!("skipping unreadable recovery record {}: {e}", path.display()),
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Delete the record files for the given fingerprints. Returns how many
    /// files were removed.
    pub fn prune<'a>(
        &self,
        fingerprints: impl IntoIterator<Item = &'a Fingerprint>,
    ) -> Result<usize, CacheError> {
        let mut removed = 0;
        for fp in fingerprints {
            let path = self.dir.join(fp.digest());
            if path.exists() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
