//! # Tree Subcommand
//!
//! Restores a `standard-v1` tree dump (as stored with every batch root),
//! re-checking every internal node, and prints the root. With `--leaf`,
//! also prints that leaf's inclusion proof as a JSON array.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use dcert_core::Bytes32;
use dcert_crypto::{MerkleError, StandardMerkleTree};

/// Arguments for `dcert tree`.
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Tree dump JSON file.
    #[arg(value_name = "DUMP")]
    pub file: PathBuf,

    /// Print the inclusion proof of this leaf value (`0x` + 64 hex digits).
    #[arg(long, value_name = "HASH")]
    pub leaf: Option<Bytes32>,
}

/// Execute `dcert tree`.
pub fn run_tree(args: &TreeArgs, out: &mut impl Write) -> Result<u8> {
    let dump = crate::read_json(&args.file)?;
    let tree = match StandardMerkleTree::restore_json(&dump) {
        Ok(tree) => tree,
        Err(e @ MerkleError::IntegrityViolation(_)) => {
            writeln!(out, "FAILED: {e}")?;
            return Ok(1);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("cannot restore {}", args.file.display()))
        }
    };

    writeln!(out, "root: {}", tree.root())?;
    writeln!(out, "leaves: {}", tree.len())?;

    if let Some(leaf) = &args.leaf {
        match tree.get_proof(leaf) {
            Ok(proof) => {
                let proof: Vec<String> = proof.iter().map(Bytes32::to_hex).collect();
                writeln!(out, "proof: {}", serde_json::to_string(&proof)?)?;
            }
            Err(e @ MerkleError::LeafNotFound(_)) => {
                writeln!(out, "FAILED: {e}")?;
                return Ok(1);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(0)
}
