//! # Standard Merkle Tree
//!
//! A complete binary tree over `bytes32` leaves whose root, proofs and dump
//! format are interchangeable with the widely deployed JavaScript
//! `StandardMerkleTree` (leaf encoding `["bytes32"]`), so that anyone holding
//! a certificate artifact can check it with off-the-shelf tooling and the
//! on-chain `verifyLeaf` accepts the proofs produced here.
//!
//! ## Construction
//!
//! - Leaf node: `keccak256(keccak256(value))`. The double hash keeps a leaf
//!   from ever being mistaken for an internal node.
//! - Internal node: `keccak256(min(a, b) || max(a, b))`. Sorting the pair
//!   makes proofs position-free: a verifier needs only the sibling hashes.
//! - Leaf nodes are sorted ascending and laid out right-to-left at the end
//!   of a flat array of `2n - 1` nodes; node `i` has children `2i + 1` and
//!   `2i + 2`. The root is node `0`.
//!
//! ## Dump Format
//!
//! ```json
//! {
//!   "format": "standard-v1",
//!   "leafEncoding": ["bytes32"],
//!   "tree": ["0x…", …],
//!   "values": [{ "value": ["0x…"], "treeIndex": 4 }, …]
//! }
//! ```
//!
//! `values` keeps the caller's insertion order. [`StandardMerkleTree::restore`]
//! re-checks every node, so a stored dump cannot silently drift from its root.

use std::collections::{HashMap, HashSet};

use dcert_core::{Bytes32, InclusionSignature};
use serde::{Deserialize, Serialize};

use crate::error::MerkleError;
use crate::keccak::{keccak256, keccak256_concat};

/// Dump format tag.
pub const DUMP_FORMAT: &str = "standard-v1";
/// The only supported leaf encoding.
pub const LEAF_ENCODING: &str = "bytes32";

// ---------------------------------------------------------------------------
// Node hashing
// ---------------------------------------------------------------------------

/// Hash a leaf value into its tree node.
pub fn leaf_hash(value: &Bytes32) -> Bytes32 {
    keccak256(keccak256(value.as_bytes()).as_bytes())
}

/// Hash two sibling nodes into their parent (order-independent).
pub fn hash_pair(a: &Bytes32, b: &Bytes32) -> Bytes32 {
    if a <= b {
        keccak256_concat(a, b)
    } else {
        keccak256_concat(b, a)
    }
}

/// Check that `value` is committed to by `root` through `proof`.
///
/// Pure function: no tree, store or ledger required.
pub fn verify_proof(root: &Bytes32, value: &Bytes32, proof: &[Bytes32]) -> bool {
    process_proof(value, proof) == *root
}

/// Fold a proof into the root it implies.
pub fn process_proof(value: &Bytes32, proof: &[Bytes32]) -> Bytes32 {
    proof
        .iter()
        .fold(leaf_hash(value), |node, sibling| hash_pair(&node, sibling))
}

fn sibling_index(i: usize) -> usize {
    if i % 2 == 1 {
        i + 1
    } else {
        i - 1
    }
}

fn parent_index(i: usize) -> usize {
    (i - 1) / 2
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// A leaf value and its position in the flat node array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    value: Bytes32,
    tree_index: usize,
}

/// An immutable Merkle tree over distinct `bytes32` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardMerkleTree {
    tree: Vec<Bytes32>,
    values: Vec<Entry>,
    by_value: HashMap<Bytes32, usize>,
}

impl StandardMerkleTree {
    /// Build a tree over `values`.
    ///
    /// # Errors
    ///
    /// [`MerkleError::EmptyInput`] for an empty slice and
    /// [`MerkleError::DuplicateLeaf`] if any value appears twice.
    pub fn build(values: &[Bytes32]) -> Result<Self, MerkleError> {
        if values.is_empty() {
            return Err(MerkleError::EmptyInput);
        }
        let mut seen = HashSet::with_capacity(values.len());
        for v in values {
            if !seen.insert(*v) {
                return Err(MerkleError::DuplicateLeaf(*v));
            }
        }

        let mut hashed: Vec<(Bytes32, usize)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (leaf_hash(v), i))
            .collect();
        hashed.sort();

        let n = values.len();
        let len = 2 * n - 1;
        let mut tree = vec![Bytes32::ZERO; len];
        let mut entries: Vec<Entry> = values
            .iter()
            .map(|v| Entry {
                value: *v,
                tree_index: 0,
            })
            .collect();
        for (j, (node, original)) in hashed.into_iter().enumerate() {
            let idx = len - 1 - j;
            tree[idx] = node;
            entries[original].tree_index = idx;
        }
        for i in (0..len - n).rev() {
            tree[i] = hash_pair(&tree[2 * i + 1], &tree[2 * i + 2]);
        }

        Ok(Self::from_parts(tree, entries))
    }

    fn from_parts(tree: Vec<Bytes32>, values: Vec<Entry>) -> Self {
        let by_value = values
            .iter()
            .enumerate()
            .map(|(i, e)| (e.value, i))
            .collect();
        Self {
            tree,
            values,
            by_value,
        }
    }

    /// The Merkle root.
    pub fn root(&self) -> Bytes32 {
        self.tree[0]
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false: a tree has at least one leaf.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Leaf values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Bytes32> {
        self.values.iter().map(|e| &e.value)
    }

    /// Whether `value` is a leaf of this tree.
    pub fn contains(&self, value: &Bytes32) -> bool {
        self.by_value.contains_key(value)
    }

    /// Sibling path from `value`'s leaf up to (excluding) the root.
    pub fn get_proof(&self, value: &Bytes32) -> Result<Vec<Bytes32>, MerkleError> {
        let entry = self
            .by_value
            .get(value)
            .map(|&i| self.values[i])
            .ok_or(MerkleError::LeafNotFound(*value))?;
        Ok(self.proof_for_index(entry.tree_index))
    }

    fn proof_for_index(&self, mut idx: usize) -> Vec<Bytes32> {
        let mut proof = Vec::new();
        while idx > 0 {
            proof.push(self.tree[sibling_index(idx)]);
            idx = parent_index(idx);
        }
        proof
    }

    /// Inclusion signatures for every leaf, keyed by leaf value.
    pub fn all_proofs(&self) -> HashMap<Bytes32, InclusionSignature> {
        let root = self.root();
        self.values
            .iter()
            .map(|e| {
                (
                    e.value,
                    InclusionSignature {
                        root,
                        proofs: self.proof_for_index(e.tree_index),
                        leaf: e.value,
                    },
                )
            })
            .collect()
    }

    /// Serializable dump of the whole tree.
    pub fn dump(&self) -> TreeDump {
        TreeDump {
            format: DUMP_FORMAT.to_string(),
            leaf_encoding: vec![LEAF_ENCODING.to_string()],
            tree: self.tree.clone(),
            values: self
                .values
                .iter()
                .map(|e| DumpValue {
                    value: vec![e.value],
                    tree_index: e.tree_index,
                })
                .collect(),
        }
    }

    /// Rebuild a tree from its dump, re-verifying every node.
    pub fn restore(dump: &TreeDump) -> Result<Self, MerkleError> {
        if dump.format != DUMP_FORMAT {
            return Err(MerkleError::InvalidDump(format!(
                "unknown format {:?}",
                dump.format
            )));
        }
        if dump.leaf_encoding.len() != 1 || dump.leaf_encoding[0] != LEAF_ENCODING {
            return Err(MerkleError::InvalidDump(format!(
                "unsupported leaf encoding {:?}",
                dump.leaf_encoding
            )));
        }
        let n = dump.values.len();
        if n == 0 {
            return Err(MerkleError::InvalidDump("no values".into()));
        }
        let len = dump.tree.len();
        if len != 2 * n - 1 {
            return Err(MerkleError::InvalidDump(format!(
                "{n} values need {} nodes, found {len}",
                2 * n - 1
            )));
        }

        let mut entries = Vec::with_capacity(n);
        let mut seen_values = HashSet::with_capacity(n);
        let mut seen_slots = HashSet::with_capacity(n);
        for dv in &dump.values {
            let [value] = dv.value.as_slice() else {
                return Err(MerkleError::InvalidDump(
                    "each value must hold exactly one bytes32".into(),
                ));
            };
            let idx = dv.tree_index;
            if idx < len - n || idx >= len {
                return Err(MerkleError::InvalidDump(format!(
                    "treeIndex {idx} is not a leaf slot"
                )));
            }
            if !seen_values.insert(*value) {
                return Err(MerkleError::DuplicateLeaf(*value));
            }
            if !seen_slots.insert(idx) {
                return Err(MerkleError::InvalidDump(format!(
                    "treeIndex {idx} used twice"
                )));
            }
            if dump.tree[idx] != leaf_hash(value) {
                return Err(MerkleError::IntegrityViolation(idx));
            }
            entries.push(Entry {
                value: *value,
                tree_index: idx,
            });
        }
        for i in 0..len - n {
            if dump.tree[i] != hash_pair(&dump.tree[2 * i + 1], &dump.tree[2 * i + 2]) {
                return Err(MerkleError::IntegrityViolation(i));
            }
        }

        Ok(Self::from_parts(dump.tree.clone(), entries))
    }

    /// Restore from an untyped JSON dump as persisted with a batch root.
    pub fn restore_json(value: &serde_json::Value) -> Result<Self, MerkleError> {
        let dump: TreeDump = serde_json::from_value(value.clone())
            .map_err(|e| MerkleError::InvalidDump(e.to_string()))?;
        Self::restore(&dump)
    }
}

// ---------------------------------------------------------------------------
// Dump types
// ---------------------------------------------------------------------------

/// Persisted form of a [`StandardMerkleTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDump {
    pub format: String,
    pub leaf_encoding: Vec<String>,
    pub tree: Vec<Bytes32>,
    pub values: Vec<DumpValue>,
}

impl TreeDump {
    /// JSON form stored alongside the batch root.
    pub fn to_json(&self) -> Result<serde_json::Value, MerkleError> {
        serde_json::to_value(self).map_err(|e| MerkleError::Serialization(e.to_string()))
    }
}

/// One leaf entry of a [`TreeDump`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpValue {
    pub value: Vec<Bytes32>,
    pub tree_index: usize,
}
