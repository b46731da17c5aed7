//! # Artifact Export

use dcert_core::CertificateArtifact;
use uuid::Uuid;

use crate::error::IssuanceError;
use crate::revoke::check_stored_hash;
use crate::service::IssuanceService;

impl IssuanceService {
    /// The portable artifact of a stored certificate. The stored payload is
    /// re-hashed first; a record that no longer matches its hash is never
    /// handed out.
    pub async fn export_artifact(
        &self,
        certificate_uuid: Uuid,
    ) -> Result<CertificateArtifact, IssuanceError> {
        let record = self
            .store
            .certificate(certificate_uuid)
            .await?
            .ok_or_else(|| IssuanceError::NotFound(format!("certificate {certificate_uuid}")))?;
        if let Err(e) = check_stored_hash(&record) {
            tracing::error!(certificate_uuid = %certificate_uuid, error = %e, "stored certificate fails hash check");
            return Err(e);
        }
        CertificateArtifact::from_record(&record)
            .map_err(|e| IssuanceError::DataConflict(e.to_string()))
    }
}
