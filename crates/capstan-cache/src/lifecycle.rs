use crate::cache::FetchCache;
use crate::durable::DurableFile;
use crate::journal::RecoveryJournal;
use crate::layout::CacheLayout;
use crate::CacheError;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::{debug, info};

/// Advisory cross-process lock on the durable cache file.
pub struct CacheLock {
    lock_file: File,
}

impl CacheLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, CacheError> {
        let file = Self::open_lock_file(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| CacheError::LockFailed(e.to_string()))?;
        Ok(Self { lock_file: file })
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CacheError> {
        let file = Self::open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }

    fn open_lock_file(lock_path: &Path) -> Result<File, CacheError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?)
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.lock_file);
    }
}

/// Loads the two cache tiers at startup and reconciles them at the end of a
/// successful run.
///
/// `open` overlays leftover recovery records onto the durable cache — the
/// leftovers are exactly what a crashed run resolved but never flushed.
/// `seal` writes the full in-memory cache durably and then deletes every
/// recovery file the durable file now captures. A run that dies before
/// `seal` leaves its recovery files for the next run; that is the system's
/// only crash-safety guarantee.
pub struct CacheLifecycle {
    layout: CacheLayout,
}

impl CacheLifecycle {
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn open(&self) -> Result<FetchCache, CacheError> {
        self.layout.initialize()?;
        let durable = DurableFile::new(self.layout.durable_file());
        let journal = RecoveryJournal::new(self.layout.recovery_dir());

        let mut entries = BTreeMap::new();
        for (fp, entry) in durable.load()? {
            entries.insert(fp, entry);
        }
        let durable_count = entries.len();

        let mut recovered = 0;
        for (fp, entry) in journal.load()? {
            if let std::collections::btree_map::Entry::Vacant(slot) = entries.entry(fp) {
                slot.insert(entry);
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!("recovered {recovered} cache entries from the crash-recovery journal");
        }
        debug!(
            "cache opened with {durable_count} durable + {recovered} recovered entries"
        );

        Ok(FetchCache::with_entries(journal, entries))
    }

    pub fn seal(&self, cache: &FetchCache) -> Result<(), CacheError> {
        let _lock = CacheLock::acquire(&self.layout.lock_file())?;
        let snapshot = cache.snapshot();
        DurableFile::new(self.layout.durable_file()).save(&snapshot)?;
        let journal = RecoveryJournal::new(self.layout.recovery_dir());
        let removed = journal.prune(snapshot.keys())?;
        if removed > 0 {
            debug!("pruned {removed} recovery files captured by the durable cache");
        }
        Ok(())
    }
}
