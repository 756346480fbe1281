use crate::record::{decode_record, encode_record, CacheEntry, RECORD_SEPARATOR};
use crate::{fsync_dir, CacheError};
use capstan_schema::Fingerprint;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// The durable cache file: every known record, written in one atomic pass
/// at the end of a successful run.
pub struct DurableFile {
    path: PathBuf,
}

impl DurableFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records. Malformed blocks are skipped with a warning so one
    /// damaged entry cannot make the cache unusable.
    pub fn load(&self) -> Result<Vec<(Fingerprint, CacheEntry)>, CacheError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        debug!("loading durable cache from {}", self.path.display());
        let text = fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for block in text.split(RECORD_SEPARATOR) {
            if block.trim().is_empty() {
                continue;
            }
            match decode_record(block) {
                Ok(record) => entries.push(record),
                Err(e) => warn!("skipping corrupt cache record: {e}"),
            }
        }
        Ok(entries)
    }

    /// Rewrite the file with the full entry set, atomically.
    pub fn save(&self, entries: &BTreeMap<Fingerprint, CacheEntry>) -> Result<(), CacheError> {
        let parent = self
            .path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        fs::create_dir_all(&parent)?;

        let mut blocks = Vec::with_capacity(entries.len());
        for (fp, entry) in entries {
            blocks.push(encode_record(fp, entry)?);
        }
        let content = blocks.join(RECORD_SEPARATOR) + "\n";

        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| CacheError::Io(e.error))?;
        fsync_dir(&parent)?;
        debug!(
            "wrote {} cache records to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }
}
