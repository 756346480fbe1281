use capstan_schema::{ContentHash, Fingerprint};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boundary between records in the durable cache file.
pub const RECORD_SEPARATOR: &str = "\n\n\n\n";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("empty fingerprint line")]
    EmptyFingerprint,
    #[error("missing entry line")]
    MissingEntry,
    #[error("invalid entry JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// One cache entry: the resolved content hash plus materialization metadata
/// added lazily on first materialization.
///
/// The same schema backs both tiers — the durable file aggregates many
/// records, a recovery file holds exactly one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub hash: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path_size: Option<u64>,
}

impl CacheEntry {
    pub fn new(hash: ContentHash) -> Self {
        Self {
            hash,
            store_path: None,
            store_path_size: None,
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.store_path.is_some() && self.store_path_size.is_some()
    }
}

/// Encode a record: the fingerprint line followed by the compact JSON entry.
pub fn encode_record(fp: &Fingerprint, entry: &CacheEntry) -> Result<String, serde_json::Error> {
    Ok(format!("{}\n{}", fp.as_str(), serde_json::to_string(entry)?))
}

/// Decode a record block. Trailing lines beyond the first two are ignored
/// (a file-final newline adds an empty third line).
pub fn decode_record(block: &str) -> Result<(Fingerprint, CacheEntry), RecordError> {
    let mut lines = block.lines();
    let fp_line = lines.next().unwrap_or_default().trim();
    if fp_line.is_empty() {
        return Err(RecordError::EmptyFingerprint);
    }
    let entry_line = lines.next().ok_or(RecordError::MissingEntry)?;
    let entry: CacheEntry = serde_json::from_str(entry_line)?;
    Ok((Fingerprint::new(fp_line), entry))
}
