use crate::flatten::{flatten, PinTable};
use crate::http::RawFileClient;
use crate::node::RepoNode;
use crate::ResolveError;
use capstan_cache::FetchCache;
use capstan_oracle::PrefetchOracle;
use capstan_schema::{FetchPolicy, FetchSpec, ManifestParser, VarEnv};
use tracing::info;

/// Name of the dependency manifest file at the root of every repository.
pub const MANIFEST_FILE: &str = "DEPS";

/// Input to a full resolution run.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub root: FetchSpec,
    /// Path label for the root entry in the output table.
    pub root_path: String,
    /// Caller-supplied condition variables; they win over manifest-declared
    /// defaults on collision.
    pub vars: VarEnv,
}

/// The resolution engine. Every collaborator is an explicit borrow — there
/// is no hidden shared state, and tests inject in-memory stand-ins.
pub struct Resolver<'a> {
    pub(crate) cache: &'a FetchCache,
    pub(crate) oracle: &'a dyn PrefetchOracle,
    pub(crate) parser: &'a dyn ManifestParser,
    pub(crate) files: &'a dyn RawFileClient,
    pub(crate) policy: &'a FetchPolicy,
}

impl<'a> Resolver<'a> {
    pub fn new(
        cache: &'a FetchCache,
        oracle: &'a dyn PrefetchOracle,
        parser: &'a dyn ManifestParser,
        files: &'a dyn RawFileClient,
        policy: &'a FetchPolicy,
    ) -> Self {
        Self {
            cache,
            oracle,
            parser,
            files,
            policy,
        }
    }

    /// Run the full pipeline: fetch the root, expand the manifest tree,
    /// prefetch every node, and flatten the result.
    pub fn run(&self, request: ResolveRequest) -> Result<PinTable, ResolveError> {
        let mut root = RepoNode::new(request.root);

        info!("fetching the root source");
        self.resolve_node(&mut root)?;

        info!("expanding the dependency tree");
        self.expand(&mut root, &request.vars, &request.root_path)?;

        info!("prefetching {} sources", root.node_count());
        self.prefetch_all(&mut root)?;

        Ok(flatten(&root, &request.root_path))
    }

    /// Move a node to hash-resolved, via the cache. No-op once resolved.
    pub fn resolve_node(&self, node: &mut RepoNode) -> Result<(), ResolveError> {
        if node.is_resolved() {
            return Ok(());
        }
        let hash = self.cache.resolve(&node.spec, self.oracle)?;
        node.set_hash(hash);
        Ok(())
    }

    /// Move a node to materialized, resolving first when needed. Returns
    /// the content location and its byte size.
    pub fn materialize_node(&self, node: &mut RepoNode) -> Result<(String, u64), ResolveError> {
        self.resolve_node(node)?;
        Ok(self.cache.materialize(&node.spec, self.oracle)?)
    }

    /// Resolve and materialize the whole subtree. Siblings carry no
    /// ordering constraint; this walks them in path order.
    pub fn prefetch_all(&self, node: &mut RepoNode) -> Result<(), ResolveError> {
        self.materialize_node(node)?;
        for child in node.children.values_mut() {
            self.prefetch_all(child)?;
        }
        Ok(())
    }
}
