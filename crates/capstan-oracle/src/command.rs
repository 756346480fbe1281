use crate::process::run_command;
use crate::{OracleError, PrefetchOracle};
use capstan_schema::ContentHash;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// External binaries the oracle client invokes, and the mapping from neutral
/// fetcher kinds to the fetcher names the prefetch binary understands.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub prefetch_bin: String,
    pub build_bin: String,
    pub size_bin: String,
    pub fetcher_names: BTreeMap<String, String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        let mut fetcher_names = BTreeMap::new();
        fetcher_names.insert("git".to_owned(), "fetchgit".to_owned());
        fetcher_names.insert("github".to_owned(), "fetchFromGitHub".to_owned());
        fetcher_names.insert("gitiles".to_owned(), "fetchFromGitiles".to_owned());
        Self {
            prefetch_bin: "nix-universal-prefetch".to_owned(),
            build_bin: "nix-build".to_owned(),
            size_bin: "du".to_owned(),
            fetcher_names,
        }
    }
}

/// Subprocess-backed prefetch oracle.
///
/// `hash_of` runs the universal prefetcher, which fetches the content once
/// and prints its hash. `materialize` evaluates the equivalent fetch
/// expression with the known hash, which realizes the content into the
/// store and prints its location.
pub struct CommandOracle {
    config: OracleConfig,
}

impl CommandOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }

    fn fetcher_name<'a>(&'a self, kind: &'a str) -> &'a str {
        self.config
            .fetcher_names
            .get(kind)
            .map_or(kind, String::as_str)
    }
}

impl PrefetchOracle for CommandOracle {
    fn hash_of(
        &self,
        kind: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<ContentHash, OracleError> {
        let mut cmd_args = vec![self.fetcher_name(kind).to_owned()];
        for (name, value) in args {
            cmd_args.push(format!("--{name}"));
            cmd_args.push(value.clone());
        }
        debug!("{} {}", self.config.prefetch_bin, cmd_args.join(" "));
        let stdout = run_command(&self.config.prefetch_bin, &cmd_args)?;
        let hash = stdout.trim();
        if hash.is_empty() {
            return Err(OracleError::MalformedOutput {
                command: self.config.prefetch_bin.clone(),
                detail: "empty hash output".to_owned(),
            });
        }
        Ok(ContentHash::new(hash))
    }

    fn materialize(
        &self,
        kind: &str,
        args: &BTreeMap<String, String>,
        hash: &ContentHash,
    ) -> Result<PathBuf, OracleError> {
        let expr = fetch_expression(self.fetcher_name(kind), args, hash);
        debug!("{} -E {expr}", self.config.build_bin);
        let stdout = run_command(&self.config.build_bin, &["-E".to_owned(), expr])?;
        // The build binary may print progress lines; the location is last.
        let location = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| OracleError::MalformedOutput {
                command: self.config.build_bin.clone(),
                detail: "no location in output".to_owned(),
            })?;
        Ok(PathBuf::from(location))
    }

    fn size_of(&self, location: &Path) -> Result<u64, OracleError> {
        let stdout = run_command(
            &self.config.size_bin,
            &["-sb".to_owned(), location.display().to_string()],
        )?;
        stdout
            .split_whitespace()
            .next()
            .and_then(|field| field.parse().ok())
            .ok_or_else(|| OracleError::MalformedOutput {
                command: self.config.size_bin.clone(),
                detail: format!("unparseable size output: {}", stdout.trim()),
            })
    }
}

/// Render the fetch expression the build binary evaluates to materialize
/// content with a known hash.
fn fetch_expression(fetcher: &str, args: &BTreeMap<String, String>, hash: &ContentHash) -> String {
    let mut expr = format!("with import <nixpkgs> {{}}; {fetcher} {{\n");
    for (name, value) in args {
        expr.push_str(&format!("  {name} = {};\n", nix_string(value)));
    }
    expr.push_str(&format!("  hash = {};\n", nix_string(hash.as_str())));
    expr.push('}');
    expr
}

/// Quote a string literal for the fetch expression. `\`, `"`, and `${` must
/// be escaped to survive unmangled.
fn nix_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
