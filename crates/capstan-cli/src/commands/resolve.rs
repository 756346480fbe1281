use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use capstan_cache::{CacheLayout, CacheLifecycle};
use capstan_oracle::{CommandOracle, CommandParser, OracleConfig};
use capstan_resolve::{render_table, HttpClient, ResolveRequest, Resolver};
use capstan_schema::{FetchPolicy, FetchSpec, JsonParser, ManifestParser, VarEnv};
use clap::ValueEnum;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ManifestFormat {
    /// DEPS-style manifests, parsed by the external helper binary.
    Deps,
    /// Manifests already rendered as JSON, parsed in-process.
    Json,
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub source_args: Vec<String>,
    pub source_path: String,
    pub output: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub recovery_dir: Option<PathBuf>,
    pub vars: Vec<String>,
    pub policy: Option<PathBuf>,
    pub manifest_format: ManifestFormat,
    pub parser_bin: String,
    pub prefetch_bin: String,
    pub build_bin: String,
}

pub fn run(options: &ResolveOptions, json_output: bool) -> Result<u8, String> {
    // Configuration errors are fatal before any fetch begins
    let root = FetchSpec::from_key_values(&options.source_args)
        .map_err(|e| format!("source arguments: {e}"))?;
    let vars = build_var_env(&options.vars)?;
    let policy = match &options.policy {
        Some(path) => FetchPolicy::from_toml_file(path).map_err(|e| e.to_string())?,
        None => FetchPolicy::default(),
    };

    let layout = cache_layout(options);
    tracing::debug!(
        "durable cache: {}, recovery dir: {}",
        layout.durable_file().display(),
        layout.recovery_dir().display()
    );
    let lifecycle = CacheLifecycle::new(layout);
    let cache = lifecycle.open().map_err(|e| format!("cache error: {e}"))?;

    let oracle = CommandOracle::new(OracleConfig {
        prefetch_bin: options.prefetch_bin.clone(),
        build_bin: options.build_bin.clone(),
        ..OracleConfig::default()
    });
    let files = HttpClient::new();
    let parser: Box<dyn ManifestParser> = match options.manifest_format {
        ManifestFormat::Deps => Box::new(CommandParser::new(options.parser_bin.clone())),
        ManifestFormat::Json => Box::new(JsonParser),
    };

    let pb = if json_output {
        None
    } else {
        Some(spinner("resolving dependency tree..."))
    };

    let resolver = Resolver::new(&cache, &oracle, parser.as_ref(), &files, &policy);
    let table = match resolver.run(ResolveRequest {
        root,
        root_path: options.source_path.clone(),
        vars,
    }) {
        Ok(table) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "dependency tree resolved");
            }
            table
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "resolution failed");
            }
            return Err(error_message(&e));
        }
    };

    let rendered = render_table(&table).map_err(|e| e.to_string())?;
    fs::write(&options.output, rendered)
        .map_err(|e| format!("failed to write {}: {e}", options.output.display()))?;

    // Only a fully successful run earns a durable cache flush
    lifecycle
        .seal(&cache)
        .map_err(|e| format!("cache error: {e}"))?;

    if json_output {
        let payload = serde_json::json!({
            "output": options.output,
            "sources": table.len(),
            "cache_entries": cache.len(),
            "status": "resolved",
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "pinned {} sources to {}",
            table.len(),
            options.output.display()
        );
    }
    Ok(EXIT_SUCCESS)
}

/// Render a resolution error with its taxonomy prefix. An oracle failure is
/// a fetch failure, not a cache problem, even though the cache layer
/// surfaced it.
fn error_message(e: &capstan_resolve::ResolveError) -> String {
    match e {
        capstan_resolve::ResolveError::Cache(capstan_cache::CacheError::Oracle(inner)) => {
            format!("oracle error: {inner}")
        }
        other => other.to_string(),
    }
}

fn cache_layout(options: &ResolveOptions) -> CacheLayout {
    let defaults = CacheLayout::for_user();
    let durable = options
        .cache_dir
        .clone()
        .unwrap_or_else(|| defaults.durable_dir().to_path_buf());
    let recovery = options
        .recovery_dir
        .clone()
        .unwrap_or_else(|| defaults.recovery_dir().to_path_buf());
    CacheLayout::new(durable, recovery)
}

/// The default condition environment pins every checkout platform to linux;
/// `--var` overrides win.
fn build_var_env(overrides: &[String]) -> Result<VarEnv, String> {
    let mut vars = VarEnv::new();
    for platform in ["ios", "chromeos", "android", "mac", "win", "linux"] {
        vars.insert(format!("checkout_{platform}"), platform == "linux");
    }
    for pair in overrides {
        let parsed = pair.split_once('=').and_then(|(name, value)| match value {
            "true" => Some((name, true)),
            "false" => Some((name, false)),
            _ => None,
        });
        let Some((name, value)) = parsed else {
            return Err(format!(
                "source arguments: malformed --var '{pair}', expected name=true|false"
            ));
        };
        vars.insert(name.to_owned(), value);
    }
    Ok(vars)
}
