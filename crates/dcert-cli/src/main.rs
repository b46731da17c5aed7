//! # dcert CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dcert_cli::artifact::{run_check, run_verify, ArtifactArgs};
use dcert_cli::hash::{run_hash, HashArgs};
use dcert_cli::tree::{run_tree, TreeArgs};

/// Inspect and verify ledger-anchored certificates.
#[derive(Parser, Debug)]
#[command(name = "dcert", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the content hash of a certificate payload.
    Hash(HashArgs),

    /// Check an artifact's hash and inclusion proof without network access.
    Check(ArtifactArgs),

    /// Verify an artifact against the ledger configured in the environment.
    Verify(ArtifactArgs),

    /// Restore a tree dump, print its root and optionally a leaf's proof.
    Tree(TreeArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut stdout = std::io::stdout().lock();
    let result = match cli.command {
        Commands::Hash(args) => run_hash(&args, &mut stdout),
        Commands::Check(args) => run_check(&args, &mut stdout),
        Commands::Verify(args) => run_verify(&args, &mut stdout).await,
        Commands::Tree(args) => run_tree(&args, &mut stdout),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
