mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::doctor::DoctorOptions;
use commands::resolve::{ManifestFormat, ResolveOptions};
use commands::{EXIT_CACHE_ERROR, EXIT_CONFIG_ERROR, EXIT_FAILURE};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "capstan",
    version,
    about = "Deterministic source pinning engine for recursive dependency manifests"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve a manifest tree into a flat table of pinned sources.
    Resolve {
        /// Fetch arguments for the root source as key=value pairs; the
        /// `fetcher` key is required (example: fetcher=gitiles
        /// url=https://chromium.googlesource.com/chromium/src rev=147f653).
        #[arg(long = "source-args", required = true, num_args = 1..)]
        source_args: Vec<String>,
        /// Path label for the root entry in the output table.
        #[arg(long = "source-path", default_value = "")]
        source_path: String,
        /// Output file for the pinned source table (example: sources.json).
        #[arg(long, short)]
        output: PathBuf,
        /// Durable cache directory (default: per-user cache home).
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Crash-recovery directory (default: per-user runtime dir).
        #[arg(long)]
        recovery_dir: Option<PathBuf>,
        /// Condition variable override (name=true|false), repeatable.
        #[arg(long = "var")]
        vars: Vec<String>,
        /// Fetch policy TOML file, replacing the built-in policy.
        #[arg(long)]
        policy: Option<PathBuf>,
        /// Manifest format.
        #[arg(long, value_enum, default_value = "deps")]
        manifest_format: ManifestFormat,
        /// External manifest parser helper binary.
        #[arg(long, default_value = "gclient-eval")]
        parser_bin: String,
        /// External prefetch binary (content hash computation).
        #[arg(long, default_value = "nix-universal-prefetch")]
        prefetch_bin: String,
        /// External build binary (content materialization).
        #[arg(long, default_value = "nix-build")]
        build_bin: String,
    },
    /// Run diagnostic checks on external binaries and the cache.
    Doctor {
        /// Durable cache directory (default: per-user cache home).
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Crash-recovery directory (default: per-user runtime dir).
        #[arg(long)]
        recovery_dir: Option<PathBuf>,
        /// External manifest parser helper binary.
        #[arg(long, default_value = "gclient-eval")]
        parser_bin: String,
        /// External prefetch binary.
        #[arg(long, default_value = "nix-universal-prefetch")]
        prefetch_bin: String,
        /// External build binary.
        #[arg(long, default_value = "nix-build")]
        build_bin: String,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CAPSTAN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Resolve {
            source_args,
            source_path,
            output,
            cache_dir,
            recovery_dir,
            vars,
            policy,
            manifest_format,
            parser_bin,
            prefetch_bin,
            build_bin,
        } => commands::resolve::run(
            &ResolveOptions {
                source_args,
                source_path,
                output,
                cache_dir,
                recovery_dir,
                vars,
                policy,
                manifest_format,
                parser_bin,
                prefetch_bin,
                build_bin,
            },
            json_output,
        ),
        Commands::Doctor {
            cache_dir,
            recovery_dir,
            parser_bin,
            prefetch_bin,
            build_bin,
        } => commands::doctor::run(
            &DoctorOptions {
                cache_dir,
                recovery_dir,
                parser_bin,
                prefetch_bin,
                build_bin,
            },
            json_output,
        ),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:")
                || msg.starts_with("source arguments:")
                || msg.starts_with("failed to read policy")
                || msg.starts_with("failed to parse policy")
            {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("cache error:") || msg.starts_with("cache lock") {
                EXIT_CACHE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
