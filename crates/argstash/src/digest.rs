//! Digest: a BLAKE3 content hash truncated to 128 bits (32 hex chars).
//!
//! Stash addresses embed the digest of the encoded value, so the same
//! namespace, name and value always produce the same address.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a digest in hex characters.
pub const DIGEST_HEX_LEN: usize = 32;

/// A content digest - 128 bits (16 bytes, 32 lowercase hex chars) of BLAKE3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

/// Errors that can occur when parsing a digest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("invalid digest length: expected 32 hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid character in digest (lowercase hex only)")]
    InvalidHex,
}

impl Digest {
    /// Hash encoded bytes.
    pub fn of(data: &[u8]) -> Self {
        let hash_bytes = blake3::hash(data);
        Self(hex::encode(&hash_bytes.as_bytes()[..16]))
    }

    /// Parse a digest exactly as it appears in an address.
    ///
    /// Uppercase hex is rejected so that an address always formats back to
    /// the same bytes it was parsed from.
    pub fn from_str_checked(s: &str) -> Result<Self, DigestError> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(DigestError::InvalidLength(s.len()));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(DigestError::InvalidHex);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
