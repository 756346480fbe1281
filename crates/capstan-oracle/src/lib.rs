//! External process boundaries for Capstan.
//!
//! This crate implements the clients for the two external collaborators: the
//! prefetch oracle (content hashing, materialization, and size queries via
//! subprocess invocations) and the manifest parser helper (full manifest
//! grammar and condition language). `MockOracle` provides a deterministic
//! in-memory oracle for tests.

pub mod command;
pub mod mock;
pub mod parser;
mod process;

pub use command::{CommandOracle, OracleConfig};
pub use mock::MockOracle;
pub use parser::CommandParser;

use capstan_schema::ContentHash;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("malformed output from '{command}': {detail}")]
    MalformedOutput { command: String, detail: String },
    #[error("hash mismatch for {fingerprint}: expected {expected}, got {actual}")]
    HashMismatch {
        fingerprint: String,
        expected: String,
        actual: String,
    },
}

/// The prefetch oracle: computes content hashes and materializes fetched
/// content. All operations are blocking external-process invocations with no
/// internal timeouts or retries — cancellation policy belongs to the caller.
pub trait PrefetchOracle: Send + Sync {
    /// Compute the content hash for a fetch specification. The argument map
    /// never contains hash keys (the cache strips them).
    fn hash_of(
        &self,
        kind: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<ContentHash, OracleError>;

    /// Realize the content pinned by `hash` into a locally readable
    /// location.
    fn materialize(
        &self,
        kind: &str,
        args: &BTreeMap<String, String>,
        hash: &ContentHash,
    ) -> Result<PathBuf, OracleError>;

    /// Total byte size of a materialized location.
    fn size_of(&self, location: &Path) -> Result<u64, OracleError>;
}
