use crate::http::decode_base64_text;
use crate::node::RepoNode;
use crate::resolver::{Resolver, MANIFEST_FILE};
use crate::ResolveError;
use capstan_schema::{split_url_revision, RepoSource, VarEnv, KIND_GITHUB, KIND_GITILES};
use std::fs;
use std::path::Path;
use tracing::debug;

impl Resolver<'_> {
    /// Read a file from a node's repository.
    ///
    /// Hosted platforms expose raw-content endpoints, so a single manifest
    /// read does not force materializing the whole tree; every other kind
    /// materializes first and reads from disk.
    pub fn read_repo_file(&self, node: &mut RepoNode, path: &str) -> Result<String, ResolveError> {
        match node.spec.kind.as_str() {
            KIND_GITHUB => {
                let owner = required_arg(node, "owner")?;
                let repo = required_arg(node, "repo")?;
                let rev = required_arg(node, "rev")?;
                let url =
                    format!("https://raw.githubusercontent.com/{owner}/{repo}/{rev}/{path}");
                let body = self.files.get(&url)?;
                String::from_utf8(body)
                    .map_err(|e| ResolveError::Payload(format!("{url}: {e}")))
            }
            KIND_GITILES => {
                let base = required_arg(node, "url")?;
                let rev = required_arg(node, "rev")?;
                let url = format!("{base}/+/{rev}/{path}?format=TEXT");
                let body = self.files.get(&url)?;
                let decoded = decode_base64_text(&body)?;
                String::from_utf8(decoded)
                    .map_err(|e| ResolveError::Payload(format!("{url}: {e}")))
            }
            _ => {
                let (location, _) = self.materialize_node(node)?;
                Ok(fs::read_to_string(Path::new(&location).join(path))?)
            }
        }
    }

    /// Expand one node's manifest into child nodes, recursing where the
    /// manifest asks for it.
    pub fn expand(
        &self,
        node: &mut RepoNode,
        vars: &VarEnv,
        path: &str,
    ) -> Result<(), ResolveError> {
        debug!("expanding manifest at '{path}'");
        let text = self.read_repo_file(node, MANIFEST_FILE)?;
        let manifest = self.parser.parse(&text)?;

        // Manifest-declared defaults, overridden by the caller's view.
        let mut effective = manifest.vars.clone();
        for (name, value) in vars {
            effective.insert(name.clone(), *value);
        }

        let prefix = if manifest.use_relative_paths && !path.is_empty() {
            format!("{path}/")
        } else {
            String::new()
        };

        for (dep_name, dep) in &manifest.deps {
            let included = match &dep.condition {
                Some(expr) => self.parser.evaluate_condition(expr, &effective)?,
                None => true,
            };
            if !included {
                debug!("skipping '{dep_name}' (condition is false)");
                continue;
            }
            let Some(pinned) = &dep.url else {
                debug!("skipping '{dep_name}' (not repository-backed)");
                continue;
            };
            let (url, rev) = split_url_revision(pinned);
            let source = RepoSource::classify(&url, rev.as_deref().unwrap_or_default());
            let child = RepoNode::new(source.into_spec(self.policy));
            node.children.insert(format!("{prefix}{dep_name}"), child);
        }

        for key in &manifest.recursedeps {
            let dep_path = format!("{prefix}{key}");
            if self.policy.is_recursion_excluded(&dep_path) {
                debug!("not recursing into excluded path '{dep_path}'");
                continue;
            }
            // A recurse key without a matching child is silently skipped
            let Some(child) = node.children.get_mut(&dep_path) else {
                continue;
            };
            self.expand(child, &effective, &dep_path)?;
        }
        Ok(())
    }
}

fn required_arg<'a>(node: &'a RepoNode, name: &str) -> Result<&'a str, ResolveError> {
    node.spec
        .args
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ResolveError::MissingArgument {
            kind: node.spec.kind.clone(),
            name: name.to_owned(),
        })
}
