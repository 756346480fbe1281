use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Condition-variable environment: variable name → boolean value.
///
/// When recursing into a child manifest, the child's declared variables are
/// merged with the caller-supplied environment and the caller wins on
/// collision.
pub type VarEnv = BTreeMap<String, bool>;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("unsupported condition expression '{0}'")]
    UnsupportedCondition(String),
    #[error("condition references undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("manifest helper failed: {0}")]
    Helper(String),
}

/// The parsed form of one dependency manifest.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ParsedManifest {
    /// Variables the manifest declares, with their default values.
    #[serde(default)]
    pub vars: VarEnv,
    /// Declared dependencies, keyed by relative path.
    #[serde(default)]
    pub deps: BTreeMap<String, DepEntry>,
    /// Dependency keys whose own manifests should be expanded in turn.
    #[serde(default)]
    pub recursedeps: Vec<String>,
    /// Whether child paths are registered relative to this manifest's path.
    #[serde(default)]
    pub use_relative_paths: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DepEntry {
    /// Pinned repository URL (`<url>@<revision>`). Entries without a URL are
    /// not repository-backed and are dropped during expansion.
    #[serde(default)]
    pub url: Option<String>,
    /// Inclusion condition, evaluated against the effective variable
    /// environment. Absent means unconditionally included.
    #[serde(default)]
    pub condition: Option<String>,
}

/// External manifest collaborator: parses manifest text and evaluates
/// per-dependency inclusion conditions. A parse failure is fatal for the
/// node being expanded.
pub trait ManifestParser {
    fn parse(&self, text: &str) -> Result<ParsedManifest, ManifestError>;

    fn evaluate_condition(&self, expr: &str, vars: &VarEnv) -> Result<bool, ManifestError>;
}

/// Adapter for manifests already rendered as JSON — the same shape the
/// external parser helper emits.
///
/// Condition support is deliberately minimal: a bare variable name with
/// optional `!`/`not` negation. The full condition language lives in the
/// external helper ([`evaluate_condition`](ManifestParser::evaluate_condition)
/// rejects anything richer).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl ManifestParser for JsonParser {
    fn parse(&self, text: &str) -> Result<ParsedManifest, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    fn evaluate_condition(&self, expr: &str, vars: &VarEnv) -> Result<bool, ManifestError> {
        let trimmed = expr.trim();
        let (negated, name) = if let Some(rest) = trimmed.strip_prefix("not ") {
            (true, rest.trim())
        } else if let Some(rest) = trimmed.strip_prefix('!') {
            (true, rest.trim())
        } else {
            (false, trimmed)
        };
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ManifestError::UnsupportedCondition(expr.to_owned()));
        }
        let value = vars
            .get(name)
            .copied()
            .ok_or_else(|| ManifestError::UndefinedVariable(name.to_owned()))?;
        Ok(if negated { !value } else { value })
    }
}
