use crate::policy::FetchPolicy;
use crate::types::ContentHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Plain git remote, fetched by URL and revision.
pub const KIND_GIT: &str = "git";
/// GitHub-hosted repository, fetched by owner/repo/revision.
pub const KIND_GITHUB: &str = "github";
/// Repository on a googlesource.com (gitiles) host.
pub const KIND_GITILES: &str = "gitiles";

/// Argument keys that carry a content hash. They are excluded from cache
/// identity and from the output table's argument set.
pub(crate) const HASH_KEYS: [&str; 2] = ["hash", "sha256"];

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("a 'fetcher' key is required in the source arguments (example: fetcher=gitiles)")]
    MissingFetcher,
    #[error("malformed source argument '{0}', expected key=value")]
    InvalidArg(String),
}

/// A fetch specification: a fetcher kind plus its string arguments.
///
/// Arguments are never mutated after construction; a resolved hash lives on
/// the owning repo node, not here. An explicit `hash`/`sha256` argument is a
/// user-supplied pin that bypasses the prefetch oracle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchSpec {
    pub kind: String,
    pub args: BTreeMap<String, String>,
}

impl FetchSpec {
    pub fn new(kind: impl Into<String>, args: BTreeMap<String, String>) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }

    /// Parse `key=value` pairs from the command line. The `fetcher` key is
    /// required and becomes the spec kind.
    pub fn from_key_values(pairs: &[String]) -> Result<Self, SpecError> {
        let mut args = BTreeMap::new();
        for pair in pairs {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(SpecError::InvalidArg(pair.clone()));
            };
            args.insert(key.to_owned(), value.to_owned());
        }
        let kind = args.remove("fetcher").ok_or(SpecError::MissingFetcher)?;
        Ok(Self { kind, args })
    }

    /// The user-supplied pin, if any (`hash` takes precedence over `sha256`).
    pub fn known_hash(&self) -> Option<ContentHash> {
        HASH_KEYS
            .iter()
            .find_map(|key| self.args.get(*key))
            .map(|h| ContentHash::new(h.clone()))
    }

    /// Arguments with hash keys removed — what identifies the fetch and what
    /// the oracle and output table see.
    pub fn public_args(&self) -> BTreeMap<String, String> {
        self.args
            .iter()
            .filter(|(key, _)| !HASH_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Split a pinned URL (`<url>@<revision>`) into its parts. The separator is
/// the last `@` after the scheme, so user-info in the authority survives.
pub fn split_url_revision(pinned: &str) -> (String, Option<String>) {
    let scheme_end = pinned.find("://").map_or(0, |i| i + 3);
    match pinned[scheme_end..].rfind('@') {
        Some(i) => {
            let at = scheme_end + i;
            (
                pinned[..at].to_owned(),
                Some(pinned[at + 1..].to_owned()),
            )
        }
        None => (pinned.to_owned(), None),
    }
}

/// A repository URL classified into a fetcher variant.
///
/// Classification happens exactly once, at child construction time;
/// everything downstream dispatches on the resulting spec kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    GitHub {
        owner: String,
        repo: String,
        rev: String,
    },
    Gitiles {
        url: String,
        rev: String,
    },
    Git {
        url: String,
        rev: String,
    },
}

impl RepoSource {
    pub fn classify(url: &str, rev: &str) -> Self {
        if let Some((owner, repo)) = github_owner_repo(url) {
            return RepoSource::GitHub {
                owner,
                repo,
                rev: rev.to_owned(),
            };
        }
        if is_googlesource(url) {
            return RepoSource::Gitiles {
                url: url.to_owned(),
                rev: rev.to_owned(),
            };
        }
        RepoSource::Git {
            url: url.to_owned(),
            rev: rev.to_owned(),
        }
    }

    /// Build the fetch specification for this source. Sources whose URL has
    /// a pruning policy entry gain a `postFetch` argument that removes the
    /// pruned subtrees from the materialized content.
    pub fn into_spec(self, policy: &FetchPolicy) -> FetchSpec {
        let mut args = BTreeMap::new();
        let kind = match self {
            RepoSource::GitHub { owner, repo, rev } => {
                args.insert("owner".to_owned(), owner);
                args.insert("repo".to_owned(), repo);
                args.insert("rev".to_owned(), rev);
                KIND_GITHUB
            }
            RepoSource::Gitiles { url, rev } => {
                if let Some(script) = policy.post_fetch_script(&url) {
                    args.insert("postFetch".to_owned(), script);
                }
                args.insert("url".to_owned(), url);
                args.insert("rev".to_owned(), rev);
                KIND_GITILES
            }
            RepoSource::Git { url, rev } => {
                if let Some(script) = policy.post_fetch_script(&url) {
                    args.insert("postFetch".to_owned(), script);
                }
                args.insert("url".to_owned(), url);
                args.insert("rev".to_owned(), rev);
                KIND_GIT
            }
        };
        FetchSpec::new(kind, args)
    }
}

fn github_owner_repo(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("https://github.com/")?;
    let (owner, repo) = rest.rsplit_once('/')?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner.to_owned(), repo.to_owned()))
}

fn is_googlesource(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("https://") else {
        return false;
    };
    let host = rest.split('/').next().unwrap_or_default();
    host.ends_with(".googlesource.com")
}
