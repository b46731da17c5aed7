//! # Artifact Subcommands
//!
//! `dcert check` runs entirely offline: the payload must hash to the
//! claimed hash and signed leaf, and the proof must lead from the leaf to
//! the artifact's root. It cannot tell whether that root was ever anchored
//! or whether the leaf was revoked.
//!
//! `dcert verify` asks the ledger configured in the environment
//! (`LEDGER_RPC_URL`, `LEDGER_CONTRACT_ADDRESS`). Verification is a read, so
//! no signing key is needed.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use dcert_core::CertificateArtifact;
use dcert_issuance::{
    check_offline, is_expired, verify_artifact_at, CertificateStatus, IssuanceError,
};
use dcert_ledger::{EvmLedger, Ledger, LedgerConfig};

/// Arguments for `dcert check` and `dcert verify`.
#[derive(Args, Debug)]
pub struct ArtifactArgs {
    /// Certificate artifact file.
    #[arg(value_name = "ARTIFACT")]
    pub file: PathBuf,
}

/// Load an artifact file.
pub fn load_artifact(path: &Path) -> Result<CertificateArtifact> {
    let text = crate::read_file(path)?;
    CertificateArtifact::from_json(&text)
        .with_context(|| format!("{} is not a certificate artifact", path.display()))
}

/// Execute `dcert check`.
pub fn run_check(args: &ArtifactArgs, out: &mut impl Write) -> Result<u8> {
    let artifact = load_artifact(&args.file)?;
    match check_offline(&artifact) {
        Ok(()) => {
            writeln!(
                out,
                "OK: certificate {} leaf {} proves into root {}",
                artifact.certificate_uuid, artifact.signature.leaf, artifact.signature.root
            )?;
            if is_expired(&artifact.certificate_json, Utc::now()) {
                writeln!(out, "NOTE: certificate has expired")?;
            }
            Ok(0)
        }
        Err(e @ (IssuanceError::DataConflict(_) | IssuanceError::VerificationFailed)) => {
            writeln!(out, "FAILED: {e}")?;
            Ok(1)
        }
        Err(e) => Err(e.into()),
    }
}

/// Execute `dcert verify` against the ledger configured in the environment.
pub async fn run_verify(args: &ArtifactArgs, out: &mut impl Write) -> Result<u8> {
    let Some(config) = LedgerConfig::from_env()? else {
        bail!("LEDGER_RPC_URL is not set; use `dcert check` for an offline check");
    };
    let ledger = EvmLedger::new(config)?;
    run_verify_with(&ledger, args, out).await
}

/// Execute `dcert verify` against `ledger`.
pub async fn run_verify_with(
    ledger: &dyn Ledger,
    args: &ArtifactArgs,
    out: &mut impl Write,
) -> Result<u8> {
    let artifact = load_artifact(&args.file)?;
    tracing::debug!(ledger = ledger.name(), certificate_uuid = %artifact.certificate_uuid, "verifying");

    match verify_artifact_at(ledger, &artifact, Utc::now()).await {
        Ok(report) => {
            let status = match report.certificate {
                CertificateStatus::Valid => "valid",
                CertificateStatus::Expired => "expired",
                CertificateStatus::Revoked => "revoked",
            };
            writeln!(out, "{}: {status}", artifact.certificate_uuid)?;
            Ok(if report.certificate == CertificateStatus::Valid {
                0
            } else {
                1
            })
        }
        Err(e @ (IssuanceError::DataConflict(_) | IssuanceError::VerificationFailed)) => {
            writeln!(out, "FAILED: {e}")?;
            Ok(1)
        }
        Err(e) => Err(e.into()),
    }
}
