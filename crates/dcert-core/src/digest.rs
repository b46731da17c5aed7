//! # 32-Byte Digests
//!
//! Defines [`Bytes32`], the single representation of every `bytes32` word
//! exchanged with the ledger (content hashes, Merkle roots, proof siblings),
//! and [`content_hash()`], the SHA-256 content hash of a canonical payload.
//!
//! ## Wire Format
//!
//! `Bytes32` serializes as `"0x"` followed by 64 lowercase hex characters.
//! Parsing accepts upper- or lowercase hex and requires the `0x` prefix, so
//! a value read from an artifact round-trips to the exact stored string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;
use crate::error::ValidationError;

/// A 32-byte word, ordered bytewise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Bytes32([u8; 32]);

impl Bytes32 {
    /// The all-zero word.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Copy out the raw bytes.
    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Build from a slice that must be exactly 32 bytes long.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(slice).ok().map(Self)
    }

    /// Return the word as `0x` + 64 lowercase hex chars.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(66);
        s.push_str("0x");
        for b in &self.0 {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }

    /// Parse `0x` + 64 hex chars.
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidBytes32(s.to_string());
        let digits = s.strip_prefix("0x").ok_or_else(invalid)?;
        if digits.len() != 64 || !digits.is_ascii() {
            return Err(invalid());
        }
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[2 * i..2 * i + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(out))
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes32({})", self.to_hex())
    }
}

impl FromStr for Bytes32 {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 32]> for Bytes32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Bytes32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Bytes32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Bytes32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Compute the content hash of a canonical payload: SHA-256 over its bytes.
///
/// The input must be [`CanonicalBytes`]. Raw byte slices are not accepted.
pub fn content_hash(data: &CanonicalBytes) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    Bytes32(hasher.finalize().into())
}
