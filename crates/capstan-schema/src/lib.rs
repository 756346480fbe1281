//! Fetch specifications, fingerprints, the manifest data model, and fetch
//! policy configuration for Capstan.
//!
//! This crate is the pure data layer: `FetchSpec` (a fetcher kind plus its
//! arguments), the canonical `Fingerprint` used as the cache key, the
//! `ParsedManifest` shape produced by manifest parsers, and `FetchPolicy`
//! for per-source pruning and recursion exclusions.

pub mod fingerprint;
pub mod manifest;
pub mod policy;
pub mod spec;
pub mod types;

pub use manifest::{DepEntry, JsonParser, ManifestError, ManifestParser, ParsedManifest, VarEnv};
pub use policy::{FetchPolicy, PolicyError};
pub use spec::{
    split_url_revision, FetchSpec, RepoSource, SpecError, KIND_GIT, KIND_GITHUB, KIND_GITILES,
};
pub use types::{ContentHash, Fingerprint};
