use crate::CacheError;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem locations for the two cache tiers.
///
/// The durable directory lives under the user's cache home and survives
/// reboots; the recovery directory lives in the per-user volatile runtime
/// area, which is enough for its purpose (bridging a crash until the next
/// run) and keeps the write-per-resolution churn off persistent storage.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    durable_dir: PathBuf,
    recovery_dir: PathBuf,
}

impl CacheLayout {
    pub fn new(durable_dir: impl Into<PathBuf>, recovery_dir: impl Into<PathBuf>) -> Self {
        Self {
            durable_dir: durable_dir.into(),
            recovery_dir: recovery_dir.into(),
        }
    }

    /// The default per-user layout, honoring the XDG base directories.
    pub fn for_user() -> Self {
        let durable_dir = std::env::var_os("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
            .unwrap_or_else(|| PathBuf::from(".capstan"))
            .join("capstan");
        let recovery_dir = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("/run/user/{}", current_uid())))
            .join("capstan-recovery");
        Self {
            durable_dir,
            recovery_dir,
        }
    }

    #[inline]
    pub fn durable_dir(&self) -> &Path {
        &self.durable_dir
    }

    #[inline]
    pub fn recovery_dir(&self) -> &Path {
        &self.recovery_dir
    }

    #[inline]
    pub fn durable_file(&self) -> PathBuf {
        self.durable_dir.join("cache.txt")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.durable_dir.join(".lock")
    }

    pub fn initialize(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.durable_dir)?;
        fs::create_dir_all(&self.recovery_dir)?;
        Ok(())
    }
}

/// Safe wrapper around libc::getuid().
#[allow(unsafe_code)]
fn current_uid() -> u32 {
    // SAFETY: getuid() is always safe — no arguments, no side effects, cannot fail.
    unsafe { libc::getuid() }
}
