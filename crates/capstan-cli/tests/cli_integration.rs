//! CLI subprocess integration tests.
//!
//! These tests invoke the `capstan` binary as a subprocess and verify exit
//! codes, output file stability, and JSON output. The prefetch oracle is
//! replaced with shell scripts so no network or store tooling is needed.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

fn capstan_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_capstan"))
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

/// A fake oracle environment: a fixture repo with a DEPS manifest, a
/// prefetch script that records its calls, and a build script that
/// "materializes" by printing the fixture directory.
struct Fixture {
    dir: tempfile::TempDir,
    prefetch_bin: PathBuf,
    build_bin: PathBuf,
    calls_file: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("repo");
        std::fs::create_dir_all(&repo_dir).unwrap();
        std::fs::write(
            repo_dir.join("DEPS"),
            r#"{"deps": {"lib": {"url": "https://github.com/acme/lib@def456"}}}"#,
        )
        .unwrap();

        let calls_file = dir.path().join("prefetch-calls");
        let prefetch_bin = dir.path().join("fake-prefetch.sh");
        write_script(
            &prefetch_bin,
            &format!(
                r#"echo "$1" >> {}
case "$1" in
  fetchgit) echo sha256-ROOT ;;
  fetchFromGitHub) echo sha256-LIB ;;
  *) echo sha256-OTHER ;;
esac"#,
                calls_file.display()
            ),
        );

        let build_bin = dir.path().join("fake-build.sh");
        write_script(&build_bin, &format!("echo {}", repo_dir.display()));

        Fixture {
            dir,
            prefetch_bin,
            build_bin,
            calls_file,
        }
    }

    fn resolve_cmd(&self, output: &Path) -> Command {
        let mut cmd = capstan_bin();
        cmd.args([
            "resolve",
            "--manifest-format",
            "json",
            "--source-path",
            "",
            "--source-args",
            "fetcher=git",
            "url=https://example.com/r.git",
            "rev=abc123",
        ]);
        cmd.arg("--output").arg(output);
        cmd.arg("--cache-dir").arg(self.dir.path().join("cache"));
        cmd.arg("--recovery-dir")
            .arg(self.dir.path().join("recovery"));
        cmd.arg("--prefetch-bin").arg(&self.prefetch_bin);
        cmd.arg("--build-bin").arg(&self.build_bin);
        cmd
    }

    fn prefetch_calls(&self) -> usize {
        std::fs::read_to_string(&self.calls_file)
            .map(|text| text.lines().count())
            .unwrap_or(0)
    }
}

#[test]
fn cli_version_exits_zero() {
    let output = capstan_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "capstan --version must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("capstan"));
}

#[test]
fn cli_help_lists_commands() {
    let output = capstan_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("resolve"));
    assert!(stdout.contains("doctor"));
    assert!(stdout.contains("completions"));
}

#[test]
fn missing_fetcher_key_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = capstan_bin()
        .args([
            "resolve",
            "--source-args",
            "url=https://example.com/r.git",
            "--output",
        ])
        .arg(dir.path().join("out.json"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("fetcher"), "stderr: {stderr}");
}

#[test]
fn malformed_var_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = capstan_bin()
        .args([
            "resolve",
            "--source-args",
            "fetcher=git",
            "url=u",
            "rev=r",
            "--var",
            "checkout_mac=maybe",
            "--output",
        ])
        .arg(dir.path().join("out.json"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn resolve_writes_pin_table_and_seals_cache() {
    let fixture = Fixture::new();
    let out_path = fixture.dir.path().join("sources.json");

    let output = fixture.resolve_cmd(&out_path).arg("--json").output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let table: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(table[""]["fetcher"], "git");
    assert_eq!(table[""]["hash"], "sha256-ROOT");
    assert_eq!(table[""]["rev"], "abc123");
    assert_eq!(table["lib"]["fetcher"], "github");
    assert_eq!(table["lib"]["hash"], "sha256-LIB");
    assert_eq!(table["lib"]["owner"], "acme");

    // Root + lib each hashed exactly once
    assert_eq!(fixture.prefetch_calls(), 2);

    // The durable cache was sealed and the recovery journal drained
    assert!(fixture.dir.path().join("cache/cache.txt").exists());
    let leftovers = std::fs::read_dir(fixture.dir.path().join("recovery"))
        .unwrap()
        .count();
    assert_eq!(leftovers, 0);

    // Structured run summary on stdout
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["status"], "resolved");
    assert_eq!(summary["sources"], 2);
}

#[test]
fn second_run_is_byte_identical_and_oracle_free() {
    let fixture = Fixture::new();
    let out_path = fixture.dir.path().join("sources.json");

    let first = fixture.resolve_cmd(&out_path).output().unwrap();
    assert!(first.status.success());
    let first_bytes = std::fs::read(&out_path).unwrap();
    assert_eq!(fixture.prefetch_calls(), 2);

    let second = fixture.resolve_cmd(&out_path).output().unwrap();
    assert!(second.status.success());
    let second_bytes = std::fs::read(&out_path).unwrap();

    assert_eq!(first_bytes, second_bytes);
    // Every fingerprint came from the durable cache
    assert_eq!(fixture.prefetch_calls(), 2);
}

#[test]
fn failing_prefetch_aborts_without_output() {
    let fixture = Fixture::new();
    let out_path = fixture.dir.path().join("sources.json");

    write_script(&fixture.prefetch_bin, "exit 7");
    let output = fixture.resolve_cmd(&out_path).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(!out_path.exists(), "no partial output may be written");
}

#[test]
fn doctor_json_reports_checks() {
    let dir = tempfile::tempdir().unwrap();
    let output = capstan_bin()
        .args([
            "doctor",
            "--json",
            "--prefetch-bin",
            "sh",
            "--build-bin",
            "sh",
            "--parser-bin",
            "sh",
            "--cache-dir",
        ])
        .arg(dir.path().join("cache"))
        .arg("--recovery-dir")
        .arg(dir.path().join("recovery"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["ok"], true);
    assert!(report["checks"].as_array().unwrap().len() >= 5);
}

#[test]
fn completions_emit_shell_script() {
    let output = capstan_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("capstan"));
}
