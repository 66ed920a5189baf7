//! Post-commit consistency check
//!
//! A document counts as signed only if its status, its join row and the
//! artifact bytes all agree. The verifier re-reads each of them from storage.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::artifacts::{sha256_hex, ArtifactError, ArtifactStore, StoredArtifact};
use crate::models::DocumentStatus;
use crate::records::{RecordError, RecordStore};

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("document {0} not found")]
    DocumentMissing(String),

    #[error("document {document_id} is {status}, expected signed")]
    NotSigned {
        document_id: String,
        status: DocumentStatus,
    },

    #[error("document {0} has no signature row")]
    SignatureMissing(String),

    #[error("signature row points at {found}, expected {expected}")]
    LocatorMismatch { expected: String, found: String },

    #[error("signed artifact {locator} unreadable: {source}")]
    Unreadable {
        locator: String,
        #[source]
        source: ArtifactError,
    },

    #[error("signed artifact {0} is empty")]
    Empty(String),

    #[error("signed artifact {locator} checksum {found} does not match {expected}")]
    ChecksumMismatch {
        locator: String,
        expected: String,
        found: String,
    },

    #[error(transparent)]
    Records(#[from] RecordError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    pub document_id: String,
    pub artifact_locator: String,
    pub signed_at: DateTime<Utc>,
    pub size: usize,
    pub sha256: String,
}

#[derive(Clone)]
pub struct StatusVerifier {
    records: RecordStore,
    artifacts: ArtifactStore,
}

impl StatusVerifier {
    pub fn new(records: RecordStore, artifacts: ArtifactStore) -> Self {
        Self { records, artifacts }
    }

    /// Confirm the committed state of a signed document
    pub async fn check(&self, document_id: &str) -> Result<VerifiedSignature, VerificationError> {
        let view = self
            .records
            .signed_view(document_id)
            .await?
            .ok_or_else(|| VerificationError::DocumentMissing(document_id.to_string()))?;

        if view.status != DocumentStatus::Signed {
            return Err(VerificationError::NotSigned {
                document_id: document_id.to_string(),
                status: view.status,
            });
        }

        let signature = view
            .signature
            .ok_or_else(|| VerificationError::SignatureMissing(document_id.to_string()))?;

        let artifact = self
            .artifacts
            .load(&signature.signed_artifact_ref)
            .await
            .map_err(|source| VerificationError::Unreadable {
                locator: signature.signed_artifact_ref.clone(),
                source,
            })?;

        if artifact.bytes.is_empty() {
            return Err(VerificationError::Empty(signature.signed_artifact_ref));
        }

        Ok(VerifiedSignature {
            document_id: view.document_id,
            sha256: sha256_hex(&artifact.bytes),
            size: artifact.bytes.len(),
            artifact_locator: signature.signed_artifact_ref,
            signed_at: signature.signed_at,
        })
    }

    /// [`check`](Self::check), plus confirm the row links exactly the artifact just written
    pub async fn verify(
        &self,
        document_id: &str,
        expected: &StoredArtifact,
    ) -> Result<VerifiedSignature, VerificationError> {
        let verified = self.check(document_id).await?;

        if verified.artifact_locator != expected.locator {
            return Err(VerificationError::LocatorMismatch {
                expected: expected.locator.clone(),
                found: verified.artifact_locator,
            });
        }
        if verified.sha256 != expected.sha256 {
            return Err(VerificationError::ChecksumMismatch {
                locator: verified.artifact_locator,
                expected: expected.sha256.clone(),
                found: verified.sha256,
            });
        }

        Ok(verified)
    }
}
