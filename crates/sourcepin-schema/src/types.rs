//! Newtype wrappers for pinned identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Algorithm tag accepted for content checksums and image digests.
pub const SHA256_PREFIX: &str = "sha256:";

const SHA256_HEX_LEN: usize = 64;
const COMMIT_HEX_LEN: usize = 40;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
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
    };
}

string_newtype!(
    /// Content checksum in `sha256:<64 lowercase hex>` form.
    Checksum
);

string_newtype!(
    /// Full 40-character lowercase hex git commit hash.
    CommitHash
);

impl Checksum {
    /// Accept a tagged checksum string. Only `sha256:` digests qualify for pinning;
    /// hex is normalized to lowercase.
    pub fn parse(value: &str) -> Option<Self> {
        let hex = value.strip_prefix(SHA256_PREFIX)?;
        Self::from_hex(hex)
    }

    /// Build a checksum from a bare 64-character hex SHA-256 digest.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() == SHA256_HEX_LEN && is_hex(hex) {
            Some(Self(format!("{SHA256_PREFIX}{}", hex.to_ascii_lowercase())))
        } else {
            None
        }
    }

    /// Build a checksum from raw SHA-256 output bytes.
    pub fn from_digest_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == SHA256_HEX_LEN / 2 {
            Some(Self(format!("{SHA256_PREFIX}{}", hex::encode(bytes))))
        } else {
            None
        }
    }

    /// The hex portion without the algorithm tag.
    pub fn hex(&self) -> &str {
        &self.0[SHA256_PREFIX.len()..]
    }
}

impl CommitHash {
    /// Accept exactly 40 hex characters; hex is normalized to lowercase.
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() == COMMIT_HEX_LEN && is_hex(value) {
            Some(Self(value.to_ascii_lowercase()))
        } else {
            None
        }
    }
}

/// True if `s` is non-empty and contains only ASCII hex digits.
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}
