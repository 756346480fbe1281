use capstan_schema::{ContentHash, FetchSpec};
use std::collections::BTreeMap;

/// One dependency in the expanded tree.
///
/// A node moves through three states: unresolved (hash is the unknown
/// sentinel), hash-resolved, and materialized (the fetch cache holds its
/// location). The hash is mutable until first resolved, then frozen. Every
/// node owns its children exclusively — two occurrences of the same
/// upstream repository stay independent nodes, and only the fetch cache
/// makes the repeat fetch free.
#[derive(Debug, Clone)]
pub struct RepoNode {
    pub spec: FetchSpec,
    hash: ContentHash,
    /// Children keyed by their full dependency path, fixed at construction.
    pub children: BTreeMap<String, RepoNode>,
}

impl RepoNode {
    pub fn new(spec: FetchSpec) -> Self {
        Self {
            spec,
            hash: ContentHash::unknown(),
            children: BTreeMap::new(),
        }
    }

    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    pub fn is_resolved(&self) -> bool {
        !self.hash.is_unknown()
    }

    /// Freeze the resolved hash. The first resolution wins; later calls are
    /// ignored.
    pub(crate) fn set_hash(&mut self, hash: ContentHash) {
        if self.hash.is_unknown() {
            self.hash = hash;
        }
    }

    /// Total number of nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .values()
            .map(RepoNode::node_count)
            .sum::<usize>()
    }
}
