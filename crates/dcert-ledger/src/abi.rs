//! # Registry Contract ABI
//!
//! Calldata encoding for the three registry functions and decoding of their
//! return data and revert payloads.
//!
//! ```solidity
//! function addRoot(bytes32 root) external;
//! function revokeLeaf(bytes32 leaf) external;
//! function verifyLeaf(bytes32 root, bytes32[] proof, bytes32 leaf) external view returns (bool);
//! ```

use dcert_core::Bytes32;
use thiserror::Error;

/// `addRoot(bytes32)`.
pub const ADD_ROOT_SELECTOR: [u8; 4] = [0xd5, 0x9e, 0x64, 0x61];
/// `revokeLeaf(bytes32)`.
pub const REVOKE_LEAF_SELECTOR: [u8; 4] = [0x71, 0xdb, 0x55, 0xf2];
/// `verifyLeaf(bytes32,bytes32[],bytes32)`.
pub const VERIFY_LEAF_SELECTOR: [u8; 4] = [0x86, 0x61, 0x62, 0x5d];
/// Solidity `Error(string)` revert payload.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

const WORD: usize = 32;

/// Errors decoding contract return data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("invalid hex data: {0}")]
    InvalidHex(String),
    #[error("expected a 32-byte bool word, got {0} bytes")]
    BadBoolLength(usize),
    #[error("bool word has non-canonical value")]
    NonCanonicalBool,
}

pub fn encode_add_root(root: &Bytes32) -> Vec<u8> {
    encode_single_word(ADD_ROOT_SELECTOR, root)
}

pub fn encode_revoke_leaf(leaf: &Bytes32) -> Vec<u8> {
    encode_single_word(REVOKE_LEAF_SELECTOR, leaf)
}

fn encode_single_word(selector: [u8; 4], word: &Bytes32) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + WORD);
    out.extend_from_slice(&selector);
    out.extend_from_slice(word.as_bytes());
    out
}

/// Head: `root`, offset of `proof` (three head words = `0x60`), `leaf`.
/// Tail: `proof.len()` followed by the proof words.
pub fn encode_verify_leaf(root: &Bytes32, proof: &[Bytes32], leaf: &Bytes32) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + WORD * (4 + proof.len()));
    out.extend_from_slice(&VERIFY_LEAF_SELECTOR);
    out.extend_from_slice(root.as_bytes());
    out.extend_from_slice(&uint_word(3 * WORD as u64));
    out.extend_from_slice(leaf.as_bytes());
    out.extend_from_slice(&uint_word(proof.len() as u64));
    for p in proof {
        out.extend_from_slice(p.as_bytes());
    }
    out
}

fn uint_word(n: u64) -> [u8; WORD] {
    let mut w = [0u8; WORD];
    w[WORD - 8..].copy_from_slice(&n.to_be_bytes());
    w
}

fn read_uint(data: &[u8], at: usize) -> Option<usize> {
    let word = data.get(at..at + WORD)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return None;
    }
    let mut n = [0u8; 8];
    n.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(n)).ok()
}

/// Decode a `bool` return value.
pub fn decode_bool(data: &[u8]) -> Result<bool, AbiError> {
    if data.len() != WORD {
        return Err(AbiError::BadBoolLength(data.len()));
    }
    if data[..WORD - 1].iter().any(|b| *b != 0) {
        return Err(AbiError::NonCanonicalBool);
    }
    match data[WORD - 1] {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(AbiError::NonCanonicalBool),
    }
}

/// Extract the reason string from an `Error(string)` revert payload.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    let offset = read_uint(body, 0)?;
    let len = read_uint(body, offset)?;
    let start = offset.checked_add(WORD)?;
    let bytes = body.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Build an `Error(string)` revert payload.
pub fn encode_revert_reason(reason: &str) -> Vec<u8> {
    let bytes = reason.as_bytes();
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(4 + 2 * WORD + padded);
    out.extend_from_slice(&ERROR_STRING_SELECTOR);
    out.extend_from_slice(&uint_word(WORD as u64));
    out.extend_from_slice(&uint_word(bytes.len() as u64));
    out.extend_from_slice(bytes);
    out.resize(4 + 2 * WORD + padded, 0);
    out
}

/// `0x`-prefixed lowercase hex.
pub fn to_hex(data: &[u8]) -> String {
    let mut s = String::with_capacity(2 + data.len() * 2);
    s.push_str("0x");
    for b in data {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// Decode `0x`-prefixed hex (an empty `0x` yields no bytes).
pub fn from_hex(s: &str) -> Result<Vec<u8>, AbiError> {
    let invalid = || AbiError::InvalidHex(s.to_string());
    let digits = s.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(invalid());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid()))
        .collect()
}
