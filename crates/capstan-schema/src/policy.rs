use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse policy: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// Per-source fetch policy: post-fetch pruning and recursion exclusions.
///
/// The default policy carries the entries the tool has always applied to the
/// main Chromium tree. Loading a policy file replaces the policy wholesale.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FetchPolicy {
    /// Source URL → subdirectories deleted from the materialized content
    /// after fetch. Keeps known high-volume test-data subtrees out of the
    /// content store.
    #[serde(default)]
    pub prune: BTreeMap<String, Vec<String>>,
    /// Dependency paths that are never recursively expanded.
    #[serde(default)]
    pub no_recurse: Vec<String>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        let mut prune = BTreeMap::new();
        prune.insert(
            "https://chromium.googlesource.com/chromium/src.git".to_owned(),
            [
                "third_party/blink/web_tests",
                "third_party/hunspell/tests",
                "content/test/data",
                "courgette/testdata",
                "extensions/test/data",
                "media/test/data",
            ]
            .iter()
            .map(|dir| (*dir).to_owned())
            .collect(),
        );
        Self {
            prune,
            no_recurse: vec!["src/third_party/squirrel.mac".to_owned()],
        }
    }
}

impl FetchPolicy {
    /// A policy with no pruning and no exclusions.
    pub fn empty() -> Self {
        Self {
            prune: BTreeMap::new(),
            no_recurse: Vec::new(),
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Shell fragment that removes the pruned subtrees from `$out` after
    /// fetch, or `None` when the URL has no pruning entry.
    pub fn post_fetch_script(&self, url: &str) -> Option<String> {
        let dirs = self.prune.get(url)?;
        if dirs.is_empty() {
            return None;
        }
        let mut script = String::new();
        for dir in dirs {
            script.push_str("rm -r $out/");
            script.push_str(dir);
            script.push_str("; ");
        }
        Some(script)
    }

    pub fn is_recursion_excluded(&self, path: &str) -> bool {
        self.no_recurse.iter().any(|excluded| excluded == path)
    }
}
