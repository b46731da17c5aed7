//! # dcert-cli — Command-Line Tool for Certificate Holders and Operators
//!
//! ## Subcommands
//!
//! - `dcert hash` — content hash of a certificate payload.
//! - `dcert check` — offline integrity check of an artifact file.
//! - `dcert verify` — full verification against the configured ledger.
//! - `dcert tree` — inspect a stored batch tree dump.
//!
//! Every subcommand writes its report to the given writer and returns the
//! process exit code: `0` on success, `1` when the checked object is not
//! acceptable. Operational failures such as an unreadable file or an
//! unreachable ledger are returned as errors and exit with `2`.

pub mod artifact;
pub mod hash;
pub mod tree;

use std::path::Path;

use anyhow::{Context, Result};

/// Read a file as UTF-8 text.
pub fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Read and parse a JSON file.
pub fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = read_file(path)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON: {}", path.display()))
}
