use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use capstan_cache::{CacheLayout, CacheLock, DurableFile, RecoveryJournal};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, Clone)]
pub struct DoctorOptions {
    pub cache_dir: Option<PathBuf>,
    pub recovery_dir: Option<PathBuf>,
    pub parser_bin: String,
    pub prefetch_bin: String,
    pub build_bin: String,
}

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    status: &'static str,
    detail: String,
}

impl Check {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
        }
    }

    fn warn(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "warn",
            detail: detail.into(),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
        }
    }
}

pub fn run(options: &DoctorOptions, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_binaries(options, &mut checks, &mut all_pass);
    check_cache(options, &mut checks, &mut all_pass);

    print_results(&checks, all_pass, json_output)
}

fn check_binaries(options: &DoctorOptions, checks: &mut Vec<Check>, all_pass: &mut bool) {
    for (name, bin, required) in [
        ("prefetch_bin", options.prefetch_bin.as_str(), true),
        ("build_bin", options.build_bin.as_str(), true),
        ("parser_bin", options.parser_bin.as_str(), false),
    ] {
        if command_exists(bin) {
            checks.push(Check::pass(name, format!("'{bin}' found on PATH")));
        } else if required {
            *all_pass = false;
            checks.push(Check::fail(name, format!("'{bin}' not found on PATH")));
        } else {
            // JSON manifests resolve without the helper
            checks.push(Check::warn(
                name,
                format!("'{bin}' not found on PATH (only needed for --manifest-format deps)"),
            ));
        }
    }
}

fn check_cache(options: &DoctorOptions, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let defaults = CacheLayout::for_user();
    let durable = options
        .cache_dir
        .clone()
        .unwrap_or_else(|| defaults.durable_dir().to_path_buf());
    let recovery = options
        .recovery_dir
        .clone()
        .unwrap_or_else(|| defaults.recovery_dir().to_path_buf());
    let layout = CacheLayout::new(durable, recovery);

    match DurableFile::new(layout.durable_file()).load() {
        Ok(entries) => checks.push(Check::info(
            "durable_cache",
            format!(
                "{} entries in {}",
                entries.len(),
                layout.durable_file().display()
            ),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "durable_cache",
                format!("cannot read durable cache: {e}"),
            ));
        }
    }

    match RecoveryJournal::new(layout.recovery_dir()).load() {
        Ok(leftovers) if leftovers.is_empty() => {
            checks.push(Check::pass("recovery_journal", "no leftover records"));
        }
        Ok(leftovers) => checks.push(Check::warn(
            "recovery_journal",
            format!(
                "{} leftover records from an interrupted run (recovered automatically)",
                leftovers.len()
            ),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "recovery_journal",
                format!("cannot read recovery journal: {e}"),
            ));
        }
    }

    match CacheLock::try_acquire(&layout.lock_file()) {
        Ok(Some(_)) => checks.push(Check::pass("cache_lock", "cache lock is free")),
        Ok(None) => checks.push(Check::warn(
            "cache_lock",
            "cache lock is held by another process",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "cache_lock",
                format!("cannot check cache lock: {e}"),
            ));
        }
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let payload = serde_json::json!({
            "checks": checks,
            "ok": all_pass,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        use console::Style;
        for check in checks {
            let marker = match check.status {
                "pass" => Style::new().green().apply_to("✓").to_string(),
                "fail" => Style::new().red().apply_to("✗").to_string(),
                "warn" => Style::new().yellow().apply_to("!").to_string(),
                _ => "·".to_owned(),
            };
            println!("{marker} {}: {}", check.name, check.detail);
        }
        if !all_pass {
            println!("\nsome checks failed");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}
