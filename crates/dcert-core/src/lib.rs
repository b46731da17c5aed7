//! # dcert-core — Foundational Types for dcert
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies; externally it uses `serde`,
//! `serde_json`, `thiserror`, `chrono`, `uuid` and `sha2`.
//!
//! ## Design Principles
//!
//! 1. **[`CanonicalBytes`] is the sole path to a content hash.** A certificate
//!    payload is hashed exactly once, over the bytes produced by
//!    `CanonicalBytes::new()`. Any verifier holding the same logical payload
//!    reproduces the same bytes, on any host.
//!
//! 2. **[`Bytes32`] for every on-chain word.** Content hashes, Merkle roots,
//!    proof siblings and leaves are all `bytes32` on the ledger and are one
//!    type here, rendered as `0x` + 64 lowercase hex chars.
//!
//! 3. **Records mirror the document store.** [`CertificateRecord`],
//!    [`BatchRootRecord`], [`Graduate`] and [`Course`] carry the persisted
//!    shape; [`CertificateArtifact`] is the portable, offline-verifiable unit.

pub mod artifact;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod record;

pub use artifact::CertificateArtifact;
pub use canonical::CanonicalBytes;
pub use digest::{content_hash, Bytes32};
pub use error::{CanonicalizationError, ValidationError};
pub use record::{
    BatchRootRecord, CertificateRecord, Course, Graduate, InclusionSignature, IssueStatus,
    Signatory,
};
