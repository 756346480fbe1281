//! Recursive manifest resolution for Capstan.
//!
//! This crate ties together the schema, cache, and oracle layers into the
//! `Resolver` — the engine that fetches a root source, expands its manifest
//! tree while evaluating inclusion conditions, prefetches every node through
//! the fetch cache, and flattens the finished tree into the path-keyed pin
//! table. All collaborators (cache, oracle, manifest parser, raw file
//! client, policy) are explicit borrows, so the whole walk is unit-testable
//! with in-memory stand-ins.

mod expand;
pub mod flatten;
pub mod http;
pub mod node;
pub mod resolver;

pub use flatten::{flatten, render_table, PinTable, PinnedSource};
pub use http::{decode_base64_text, HttpClient, RawFileClient};
pub use node::RepoNode;
pub use resolver::{ResolveRequest, Resolver, MANIFEST_FILE};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("manifest error: {0}")]
    Manifest(#[from] capstan_schema::ManifestError),
    #[error("cache error: {0}")]
    Cache(#[from] capstan_cache::CacheError),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("malformed file payload: {0}")]
    Payload(String),
    #[error("fetch spec '{kind}' is missing required argument '{name}'")]
    MissingArgument { kind: String, name: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
