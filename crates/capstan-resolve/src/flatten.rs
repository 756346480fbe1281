use crate::node::RepoNode;
use capstan_schema::ContentHash;
use serde::Serialize;
use std::collections::BTreeMap;

/// One row of the output table: fetcher kind, resolved content hash, and
/// the original arguments with hash fields excluded.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PinnedSource {
    pub fetcher: String,
    pub hash: ContentHash,
    #[serde(flatten)]
    pub args: BTreeMap<String, String>,
}

/// The flat descriptor table, keyed by dependency path.
pub type PinTable = BTreeMap<String, PinnedSource>;

/// Flatten the finished tree into the path-keyed descriptor table.
///
/// Pure: one entry per node (root included), recursing with the paths fixed
/// at child construction time. Built once at the end of a run and never
/// mutated afterward.
pub fn flatten(root: &RepoNode, root_path: &str) -> PinTable {
    let mut table = PinTable::new();
    flatten_into(root, root_path, &mut table);
    table
}

fn flatten_into(node: &RepoNode, path: &str, table: &mut PinTable) {
    table.insert(
        path.to_owned(),
        PinnedSource {
            fetcher: node.spec.kind.clone(),
            hash: node.hash().clone(),
            args: node.spec.public_args(),
        },
    );
    for (child_path, child) in &node.children {
        flatten_into(child, child_path, table);
    }
}

/// The table in its on-disk form: pretty JSON with a trailing newline.
/// Byte-identical across re-runs over the same tree.
pub fn render_table(table: &PinTable) -> Result<String, serde_json::Error> {
    Ok(serde_json::to_string_pretty(table)? + "\n")
}
