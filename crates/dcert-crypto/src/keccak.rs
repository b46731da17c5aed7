//! # Keccak-256
//!
//! The ledger's native hash. Used for Merkle nodes and ABI function
//! selectors; never for content hashes, which are SHA-256 over canonical
//! bytes (see [`dcert_core::content_hash`]).

use dcert_core::Bytes32;
use sha3::{Digest, Keccak256};

/// Keccak-256 of arbitrary bytes (the pre-NIST padding used by the EVM).
pub fn keccak256(data: &[u8]) -> Bytes32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Bytes32::new(hasher.finalize().into())
}

/// Keccak-256 of two words concatenated.
pub(crate) fn keccak256_concat(a: &Bytes32, b: &Bytes32) -> Bytes32 {
    let mut hasher = Keccak256::new();
    hasher.update(a.as_bytes());
    hasher.update(b.as_bytes());
    Bytes32::new(hasher.finalize().into())
}

/// First four bytes of the Keccak-256 of a function signature.
///
/// ```
/// use dcert_crypto::keccak::selector;
/// assert_eq!(selector("addRoot(bytes32)"), [0xd5, 0x9e, 0x64, 0x61]);
/// ```
pub fn selector(signature: &str) -> [u8; 4] {
    let h = keccak256(signature.as_bytes());
    let b = h.as_bytes();
    [b[0], b[1], b[2], b[3]]
}
