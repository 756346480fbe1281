use crate::{OracleError, PrefetchOracle};
use capstan_schema::{ContentHash, FetchSpec, Fingerprint};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

struct StagedRepo {
    hash: ContentHash,
    files: Vec<(String, String)>,
}

/// Deterministic in-memory oracle for tests.
///
/// Staged specifications return their staged hash and materialize their
/// staged file tree under the mock's root directory. Unstaged
/// specifications get a hash derived from their fingerprint, so every call
/// is still deterministic. Hash calls are counted so cache tests can assert
/// the oracle was not consulted.
pub struct MockOracle {
    root: PathBuf,
    staged: Mutex<BTreeMap<Fingerprint, StagedRepo>>,
    hash_calls: AtomicUsize,
    materialize_calls: AtomicUsize,
}

impl MockOracle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staged: Mutex::new(BTreeMap::new()),
            hash_calls: AtomicUsize::new(0),
            materialize_calls: AtomicUsize::new(0),
        }
    }

    /// Stage a hash and file tree for a specification. Hash keys in the
    /// spec's arguments are ignored, as they are for cache identity.
    pub fn stage(&self, spec: &FetchSpec, hash: &str, files: &[(&str, &str)]) {
        let staged = StagedRepo {
            hash: ContentHash::new(hash),
            files: files
                .iter()
                .map(|(path, content)| ((*path).to_owned(), (*content).to_owned()))
                .collect(),
        };
        self.staged
            .lock()
            .expect("mock staging lock")
            .insert(spec.fingerprint(), staged);
    }

    pub fn hash_calls(&self) -> usize {
        self.hash_calls.load(Ordering::SeqCst)
    }

    pub fn materialize_calls(&self) -> usize {
        self.materialize_calls.load(Ordering::SeqCst)
    }

    fn fingerprint_for(kind: &str, args: &BTreeMap<String, String>) -> Fingerprint {
        FetchSpec::new(kind, args.clone()).fingerprint()
    }

    fn fallback_hash(fp: &Fingerprint) -> ContentHash {
        ContentHash::new(format!("sha256-mock{}", &fp.digest()[..32]))
    }

    fn lock_staged(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<Fingerprint, StagedRepo>>, OracleError> {
        self.staged.lock().map_err(|e| OracleError::MalformedOutput {
            command: "mock".to_owned(),
            detail: format!("staging lock poisoned: {e}"),
        })
    }
}

impl PrefetchOracle for MockOracle {
    fn hash_of(
        &self,
        kind: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<ContentHash, OracleError> {
        self.hash_calls.fetch_add(1, Ordering::SeqCst);
        let fp = Self::fingerprint_for(kind, args);
        let staged = self.lock_staged()?;
        Ok(staged
            .get(&fp)
            .map_or_else(|| Self::fallback_hash(&fp), |repo| repo.hash.clone()))
    }

    fn materialize(
        &self,
        kind: &str,
        args: &BTreeMap<String, String>,
        hash: &ContentHash,
    ) -> Result<PathBuf, OracleError> {
        self.materialize_calls.fetch_add(1, Ordering::SeqCst);
        let fp = Self::fingerprint_for(kind, args);
        let staged = self.lock_staged()?;
        if let Some(repo) = staged.get(&fp) {
            if repo.hash != *hash {
                return Err(OracleError::HashMismatch {
                    fingerprint: fp.to_string(),
                    expected: hash.to_string(),
                    actual: repo.hash.to_string(),
                });
            }
        }
        let dir = self.root.join(fp.digest());
        fs::create_dir_all(&dir)?;
        if let Some(repo) = staged.get(&fp) {
            for (path, content) in &repo.files {
                let dest = dir.join(path);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&dest, content)?;
            }
        }
        Ok(dir)
    }

    fn size_of(&self, location: &Path) -> Result<u64, OracleError> {
        dir_size(location)
    }
}

fn dir_size(path: &Path) -> Result<u64, OracleError> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}
