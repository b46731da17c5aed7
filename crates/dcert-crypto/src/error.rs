//! # Merkle Error Types

use dcert_core::Bytes32;
use thiserror::Error;

/// Errors from building, querying or restoring a Merkle tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// A tree needs at least one leaf.
    #[error("cannot build a Merkle tree with no leaves")]
    EmptyInput,

    /// Two records hash to the same leaf; their proofs would be
    /// indistinguishable.
    #[error("duplicate leaf {0}")]
    DuplicateLeaf(Bytes32),

    /// The queried value is not a leaf of this tree.
    #[error("leaf {0} is not in the tree")]
    LeafNotFound(Bytes32),

    /// The dump is not a `standard-v1` bytes32 tree.
    #[error("invalid tree dump: {0}")]
    InvalidDump(String),

    /// The dump parses but its nodes do not hash to each other.
    #[error("tree dump integrity violation at node {0}")]
    IntegrityViolation(usize),

    #[error("cannot serialize tree dump: {0}")]
    Serialization(String),
}
