//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings for on-disk
//! compatibility with the record formats in `capstan-cache`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Sentinel hash for content that has not been resolved yet (the SRI
/// encoding of 32 zero bytes).
const UNKNOWN_HASH: &str = "sha256-AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// An SRI-style content hash (`sha256-<base64>`) pinning the exact bytes
    /// of a fetched source tree.
    ContentHash
);

string_newtype!(
    /// Canonical identity string for a fetch specification, used as the
    /// cache key. Built by [`FetchSpec::fingerprint`](crate::FetchSpec::fingerprint).
    Fingerprint
);

impl ContentHash {
    /// The explicit "not resolved yet" sentinel.
    pub fn unknown() -> Self {
        Self(UNKNOWN_HASH.to_owned())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_HASH
    }
}

impl Fingerprint {
    /// Fixed-length hex digest of the fingerprint, used to name
    /// crash-recovery files (fingerprints themselves contain JSON and are
    /// not filesystem-safe).
    pub fn digest(&self) -> String {
        blake3::hash(self.0.as_bytes()).to_hex().to_string()
    }
}
