//! # dcert-crypto — Hashing and Merkle Primitives
//!
//! - **Keccak-256** ([`keccak256`]) for Merkle nodes and ABI selectors.
//! - **Standard Merkle tree** ([`StandardMerkleTree`]) over `bytes32`
//!   content hashes, producing the root anchored on the ledger and one
//!   [`InclusionSignature`](dcert_core::InclusionSignature) per certificate.
//! - **Proof verification** ([`verify_proof`]) as a pure function, usable
//!   offline by any holder of a certificate artifact.
//!
//! Content hashes themselves (SHA-256 over canonical bytes) live in
//! `dcert-core`; this crate never hashes raw payloads.

pub mod error;
pub mod keccak;
pub mod merkle;

pub use error::MerkleError;
pub use keccak::{keccak256, selector};
pub use merkle::{
    hash_pair, leaf_hash, process_proof, verify_proof, DumpValue, StandardMerkleTree, TreeDump,
};
