use crate::journal::RecoveryJournal;
use crate::record::CacheEntry;
use crate::CacheError;
use capstan_schema::{ContentHash, FetchSpec, Fingerprint};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

/// The in-memory fetch cache, threaded explicitly through the resolver.
///
/// Maps fingerprints to cache entries and guarantees at most one oracle
/// hash call per fingerprint within a process: the entry map lock is held
/// across the oracle invocation. Every freshly resolved hash is journaled
/// immediately so a crash before the end-of-run flush loses nothing.
pub struct FetchCache {
    entries: Mutex<BTreeMap<Fingerprint, CacheEntry>>,
    journal: RecoveryJournal,
}

impl FetchCache {
    pub fn new(journal: RecoveryJournal) -> Self {
        Self::with_entries(journal, BTreeMap::new())
    }

    pub fn with_entries(
        journal: RecoveryJournal,
        entries: BTreeMap<Fingerprint, CacheEntry>,
    ) -> Self {
        Self {
            entries: Mutex::new(entries),
            journal,
        }
    }

    /// Resolve a specification to its content hash.
    ///
    /// An explicit hash argument on the spec is adopted directly and
    /// supersedes any cached value. Otherwise a cached fingerprint is
    /// returned as-is, and only a genuinely new fingerprint reaches the
    /// oracle. Oracle failures propagate without writing a partial entry.
    pub fn resolve(
        &self,
        spec: &FetchSpec,
        oracle: &dyn capstan_oracle::PrefetchOracle,
    ) -> Result<ContentHash, CacheError> {
        let fp = spec.fingerprint();
        let mut entries = self.lock_entries()?;

        if let Some(known) = spec.known_hash() {
            debug!("using hash from arguments for {fp}: {known}");
            match entries.entry(fp) {
                Entry::Occupied(mut slot) => {
                    // The override supersedes a stale entry, metadata included
                    if slot.get().hash != known {
                        *slot.get_mut() = CacheEntry::new(known.clone());
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(CacheEntry::new(known.clone()));
                }
            }
            return Ok(known);
        }

        if let Some(entry) = entries.get(&fp) {
            return Ok(entry.hash.clone());
        }

        let hash = oracle.hash_of(&spec.kind, &spec.public_args())?;
        debug!("resolved {fp} -> {hash}");
        let entry = CacheEntry::new(hash.clone());
        self.journal.record(&fp, &entry)?;
        entries.insert(fp, entry);
        Ok(hash)
    }

    /// Materialize a specification's content, idempotently per fingerprint.
    ///
    /// Returns the cached location and byte size when present; otherwise
    /// resolves the hash first, asks the oracle to materialize, queries the
    /// size, and caches both.
    pub fn materialize(
        &self,
        spec: &FetchSpec,
        oracle: &dyn capstan_oracle::PrefetchOracle,
    ) -> Result<(String, u64), CacheError> {
        let hash = self.resolve(spec, oracle)?;
        let fp = spec.fingerprint();

        let mut entries = self.lock_entries()?;
        if let Some(entry) = entries.get(&fp) {
            if let (Some(path), Some(size)) = (&entry.store_path, entry.store_path_size) {
                return Ok((path.clone(), size));
            }
        }

        let location = oracle.materialize(&spec.kind, &spec.public_args(), &hash)?;
        let size = oracle.size_of(&location)?;
        let location = location.display().to_string();
        debug!("materialized {fp} at {location} ({size} bytes)");

        let entry = entries
            .entry(fp.clone())
            .or_insert_with(|| CacheEntry::new(hash));
        entry.store_path = Some(location.clone());
        entry.store_path_size = Some(size);
        self.journal.record(&fp, entry)?;
        Ok((location, size))
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(fp))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the full entry map, for persistence.
    pub fn snapshot(&self) -> BTreeMap<Fingerprint, CacheEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn lock_entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<Fingerprint, CacheEntry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|e| CacheError::LockFailed(format!("entry map poisoned: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_oracle::MockOracle;

    fn spec(pairs: &[(&str, &str)]) -> FetchSpec {
        let args = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        FetchSpec::new("git", args)
    }

    fn setup() -> (tempfile::TempDir, FetchCache, MockOracle) {
        let dir = tempfile::tempdir().unwrap();
        let cache = FetchCache::new(RecoveryJournal::new(dir.path().join("recovery")));
        let oracle = MockOracle::new(dir.path().join("store"));
        (dir, cache, oracle)
    }

    #[test]
    fn resolve_consults_oracle_once_per_fingerprint() {
        let (_dir, cache, oracle) = setup();
        let s = spec(&[("url", "u"), ("rev", "r")]);
        let h1 = cache.resolve(&s, &oracle).unwrap();
        let h2 = cache.resolve(&s, &oracle).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(oracle.hash_calls(), 1);
    }

    #[test]
    fn resolve_journals_new_hash() {
        let (_dir, cache, oracle) = setup();
        let s = spec(&[("url", "u"), ("rev", "r")]);
        cache.resolve(&s, &oracle).unwrap();
        let journal = RecoveryJournal::new(cache.journal.dir());
        assert_eq!(journal.load().unwrap().len(), 1);
    }

    #[test]
    fn explicit_hash_bypasses_oracle() {
        let (_dir, cache, oracle) = setup();
        let s = spec(&[("url", "u"), ("rev", "r"), ("hash", "sha256-pinned")]);
        let hash = cache.resolve(&s, &oracle).unwrap();
        assert_eq!(hash, "sha256-pinned");
        assert_eq!(oracle.hash_calls(), 0);
    }

    #[test]
    fn explicit_hash_supersedes_cached_entry() {
        let (_dir, cache, oracle) = setup();
        let bare = spec(&[("url", "u"), ("rev", "r")]);
        oracle.stage(&bare, "sha256-oracle", &[]);
        cache.resolve(&bare, &oracle).unwrap();

        let pinned = spec(&[("url", "u"), ("rev", "r"), ("hash", "sha256-pinned")]);
        let hash = cache.resolve(&pinned, &oracle).unwrap();
        assert_eq!(hash, "sha256-pinned");
        // The override replaced the whole entry under the shared fingerprint
        let snapshot = cache.snapshot();
        assert_eq!(snapshot[&bare.fingerprint()].hash, "sha256-pinned");
    }

    #[test]
    fn materialize_is_idempotent() {
        let (_dir, cache, oracle) = setup();
        let s = spec(&[("url", "u"), ("rev", "r")]);
        oracle.stage(&s, "sha256-h", &[("DEPS", "{}")]);
        let (loc1, size1) = cache.materialize(&s, &oracle).unwrap();
        let (loc2, size2) = cache.materialize(&s, &oracle).unwrap();
        assert_eq!(loc1, loc2);
        assert_eq!(size1, size2);
        assert_eq!(oracle.materialize_calls(), 1);
    }

    #[test]
    fn materialize_enriches_journal_record() {
        let (_dir, cache, oracle) = setup();
        let s = spec(&[("url", "u"), ("rev", "r")]);
        oracle.stage(&s, "sha256-h", &[("DEPS", "{}")]);
        cache.materialize(&s, &oracle).unwrap();
        let journal = RecoveryJournal::new(cache.journal.dir());
        let loaded = journal.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].1.is_materialized());
    }

    #[test]
    fn oracle_failure_caches_nothing() {
        let (_dir, cache, oracle) = setup();
        let s = spec(&[("url", "u"), ("rev", "r"), ("hash", "sha256-wrong")]);
        oracle.stage(&s, "sha256-right", &[]);
        // resolve adopts the pinned hash; materialization then mismatches
        let result = cache.materialize(&s, &oracle);
        assert!(result.is_err());
        let snapshot = cache.snapshot();
        assert!(!snapshot[&s.fingerprint()].is_materialized());
    }

    #[test]
    fn snapshot_reflects_loaded_entries() {
        let dir = tempfile::tempdir().unwrap();
        let journal = RecoveryJournal::new(dir.path().join("recovery"));
        let mut preloaded = BTreeMap::new();
        let s = spec(&[("url", "u"), ("rev", "r")]);
        preloaded.insert(
            s.fingerprint(),
            CacheEntry::new(ContentHash::new("sha256-loaded")),
        );
        let cache = FetchCache::with_entries(journal, preloaded);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&s.fingerprint()));

        // A loaded entry satisfies resolution without the oracle
        let oracle = MockOracle::new(dir.path().join("store"));
        let hash = cache.resolve(&s, &oracle).unwrap();
        assert_eq!(hash, "sha256-loaded");
        assert_eq!(oracle.hash_calls(), 0);
    }
}
