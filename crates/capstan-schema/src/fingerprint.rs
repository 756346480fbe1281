use crate::spec::{FetchSpec, HASH_KEYS};
use crate::types::Fingerprint;
use serde::Serialize;
use std::collections::BTreeMap;

/// The serialized shape of a fingerprint. `BTreeMap` iteration is sorted, so
/// the JSON is canonical regardless of argument insertion order.
#[derive(Serialize)]
struct CanonicalSpec<'a> {
    fetcher: &'a str,
    args: BTreeMap<&'a str, &'a str>,
}

impl FetchSpec {
    /// Stable cache identity for this specification: fetcher kind plus
    /// hash-stripped arguments in canonical key order. Two specifications
    /// differing only in a supplied hash share a fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        let args = self
            .args
            .iter()
            .filter(|(key, _)| !HASH_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        let canonical = CanonicalSpec {
            fetcher: &self.kind,
            args,
        };
        let json = serde_json::to_string(&canonical).expect("string map serializes");
        Fingerprint::new(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_from(kind: &str, pairs: &[(&str, &str)]) -> FetchSpec {
        let args = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        FetchSpec::new(kind, args)
    }

    #[test]
    fn invariant_under_argument_reordering() {
        let a = spec_from("git", &[("url", "https://example.com"), ("rev", "abc")]);
        let b = spec_from("git", &[("rev", "abc"), ("url", "https://example.com")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn independent_of_hash_fields() {
        let bare = spec_from("git", &[("url", "u"), ("rev", "r")]);
        let with_hash = spec_from("git", &[("url", "u"), ("rev", "r"), ("hash", "sha256-x")]);
        let with_sha256 = spec_from("git", &[("url", "u"), ("rev", "r"), ("sha256", "y")]);
        assert_eq!(bare.fingerprint(), with_hash.fingerprint());
        assert_eq!(bare.fingerprint(), with_sha256.fingerprint());
    }

    #[test]
    fn kind_distinguishes_fingerprints() {
        let git = spec_from("git", &[("url", "u"), ("rev", "r")]);
        let gitiles = spec_from("gitiles", &[("url", "u"), ("rev", "r")]);
        assert_ne!(git.fingerprint(), gitiles.fingerprint());
    }

    #[test]
    fn argument_values_distinguish_fingerprints() {
        let a = spec_from("git", &[("url", "u"), ("rev", "r1")]);
        let b = spec_from("git", &[("url", "u"), ("rev", "r2")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn stable_serialized_form() {
        let spec = spec_from("git", &[("url", "u"), ("rev", "r")]);
        assert_eq!(
            spec.fingerprint().as_str(),
            r#"{"fetcher":"git","args":{"rev":"r","url":"u"}}"#
        );
    }
}
