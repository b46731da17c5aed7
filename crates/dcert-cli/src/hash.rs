//! # Hash Subcommand
//!
//! Prints the content hash of a certificate payload: SHA-256 of its
//! canonical JSON form. This is the value a certificate's `leaf` carries.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use dcert_core::{content_hash, CanonicalBytes};

/// Arguments for `dcert hash`.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// Payload JSON file.
    #[arg(value_name = "PAYLOAD")]
    pub file: PathBuf,

    /// Also print the canonical form that was hashed.
    #[arg(long)]
    pub canonical: bool,
}

/// Execute `dcert hash`.
pub fn run_hash(args: &HashArgs, out: &mut impl Write) -> Result<u8> {
    let text = crate::read_file(&args.file)?;
    let canonical = CanonicalBytes::from_json_str(&text)
        .with_context(|| format!("cannot canonicalize {}", args.file.display()))?;
    if args.canonical {
        writeln!(out, "{}", canonical.as_str())?;
    }
    writeln!(out, "{}", content_hash(&canonical))?;
    Ok(0)
}
