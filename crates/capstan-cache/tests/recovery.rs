//! Crash-recovery integration tests.
//!
//! Simulates a run that resolves hashes but dies before the durable cache
//! flush, then verifies a subsequent run recovers every hash from the
//! per-fingerprint recovery files without consulting the oracle again.

use capstan_cache::{CacheLayout, CacheLifecycle, DurableFile, RecoveryJournal};
use capstan_oracle::MockOracle;
use capstan_schema::FetchSpec;

fn spec(url: &str, rev: &str) -> FetchSpec {
    FetchSpec::from_key_values(&[
        "fetcher=git".to_owned(),
        format!("url={url}"),
        format!("rev={rev}"),
    ])
    .unwrap()
}

fn layout(dir: &std::path::Path) -> CacheLayout {
    CacheLayout::new(dir.join("durable"), dir.join("recovery"))
}

#[test]
fn crashed_run_recovers_all_hashes_without_oracle_calls() {
    let dir = tempfile::tempdir().unwrap();
    let lifecycle = CacheLifecycle::new(layout(dir.path()));

    let specs: Vec<FetchSpec> = (0..5)
        .map(|i| spec(&format!("https://example.com/repo{i}.git"), "abc"))
        .collect();

    // First run: resolve everything, then "crash" — no seal.
    let hashes: Vec<_> = {
        let cache = lifecycle.open().unwrap();
        let oracle = MockOracle::new(dir.path().join("store"));
        let hashes = specs
            .iter()
            .map(|s| cache.resolve(s, &oracle).unwrap())
            .collect();
        assert_eq!(oracle.hash_calls(), 5);
        hashes
    };

    // The recovery files are all that survive the crash.
    let journal = RecoveryJournal::new(lifecycle.layout().recovery_dir());
    assert_eq!(journal.load().unwrap().len(), 5);
    assert!(DurableFile::new(lifecycle.layout().durable_file())
        .load()
        .unwrap()
        .is_empty());

    // Second run: every hash is recovered, the oracle stays silent.
    let cache = lifecycle.open().unwrap();
    let oracle = MockOracle::new(dir.path().join("store"));
    for (s, expected) in specs.iter().zip(&hashes) {
        assert_eq!(cache.resolve(s, &oracle).unwrap(), *expected);
    }
    assert_eq!(oracle.hash_calls(), 0);

    // Sealing captures the union durably and clears the recovery files.
    lifecycle.seal(&cache).unwrap();
    let durable = DurableFile::new(lifecycle.layout().durable_file())
        .load()
        .unwrap();
    assert_eq!(durable.len(), 5);
    assert!(journal.load().unwrap().is_empty());
}

#[test]
fn fully_warm_durable_cache_issues_zero_oracle_calls() {
    let dir = tempfile::tempdir().unwrap();
    let lifecycle = CacheLifecycle::new(layout(dir.path()));

    let specs: Vec<FetchSpec> = (0..3)
        .map(|i| spec(&format!("https://example.com/repo{i}.git"), "def"))
        .collect();

    // Populate and seal normally.
    {
        let cache = lifecycle.open().unwrap();
        let oracle = MockOracle::new(dir.path().join("store"));
        for s in &specs {
            cache.resolve(s, &oracle).unwrap();
        }
        lifecycle.seal(&cache).unwrap();
    }

    // A fresh run over the same specs never consults the oracle.
    let cache = lifecycle.open().unwrap();
    let oracle = MockOracle::new(dir.path().join("store"));
    for s in &specs {
        cache.resolve(s, &oracle).unwrap();
    }
    assert_eq!(oracle.hash_calls(), 0);
}

#[test]
fn recovery_survives_a_second_crash() {
    let dir = tempfile::tempdir().unwrap();
    let lifecycle = CacheLifecycle::new(layout(dir.path()));
    let first = spec("https://example.com/a.git", "r1");
    let second = spec("https://example.com/b.git", "r2");

    // Crash #1 resolves the first spec.
    {
        let cache = lifecycle.open().unwrap();
        let oracle = MockOracle::new(dir.path().join("store"));
        cache.resolve(&first, &oracle).unwrap();
    }

    // Crash #2 resolves the second; the first comes from recovery.
    {
        let cache = lifecycle.open().unwrap();
        let oracle = MockOracle::new(dir.path().join("store"));
        cache.resolve(&first, &oracle).unwrap();
        cache.resolve(&second, &oracle).unwrap();
        assert_eq!(oracle.hash_calls(), 1);
    }

    // A clean run seals the union of both crashed runs.
    let cache = lifecycle.open().unwrap();
    assert_eq!(cache.len(), 2);
    lifecycle.seal(&cache).unwrap();
    let durable = DurableFile::new(lifecycle.layout().durable_file())
        .load()
        .unwrap();
    assert_eq!(durable.len(), 2);
}
