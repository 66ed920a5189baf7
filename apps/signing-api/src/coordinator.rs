//! One signing transaction, end to end
//!
//! Resolve the document and signature, produce signed bytes (overlay when the
//! original allows it, attestation otherwise), store them, flip the document
//! to `signed` atomically and re-verify the committed state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use signing_core::{
    AttestationRequest, FallbackDocumentSynthesizer, PdfSigningEngine, PdfValidator,
    SignAttempt, SignatureStamp, SignaturePayload, SigningError, Strategy, Validation,
};
use tracing::{error, info, warn};

use crate::artifacts::{ArtifactError, ArtifactStore, StoredArtifact};
use crate::error::SignError;
use crate::models::DocumentStatus;
use crate::records::{CommitOutcome, RecordStore, SigningCommit};
use crate::verifier::StatusVerifier;

/// Why the attestation document was used instead of the original
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    ArtifactUnavailable,
    Malformed,
    Unprocessable,
    StrategiesExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignReceipt {
    pub document_id: String,
    pub signature_id: String,
    pub artifact: StoredArtifact,
    pub signed_at: DateTime<Utc>,
    pub used_fallback: bool,
    pub fallback_reason: Option<FallbackReason>,
    /// Overlay strategy that succeeded, when no fallback was needed
    pub strategy: Option<Strategy>,
    /// Present on attestation documents only
    pub verification_id: Option<String>,
}

impl SignReceipt {
    pub fn artifact_locator(&self) -> &str {
        &self.artifact.locator
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    Signed(SignReceipt),
    /// The document was signed already, by this call's competitor or earlier
    AlreadySigned { document_id: String },
}

struct Produced {
    bytes: Vec<u8>,
    strategy: Option<Strategy>,
    fallback_reason: Option<FallbackReason>,
    verification_id: Option<String>,
}

/// Inputs for the CPU-bound part, owned so it can move onto a blocking thread
struct ProductionJob {
    original: Option<Vec<u8>>,
    payload: SignaturePayload,
    title: String,
    signer_name: String,
    signed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SignatureRecordCoordinator {
    records: RecordStore,
    artifacts: ArtifactStore,
    verifier: StatusVerifier,
    validator: PdfValidator,
    engine: PdfSigningEngine,
    synthesizer: FallbackDocumentSynthesizer,
}

impl SignatureRecordCoordinator {
    pub fn new(records: RecordStore, artifacts: ArtifactStore) -> Self {
        let verifier = StatusVerifier::new(records.clone(), artifacts.clone());
        Self {
            records,
            artifacts,
            verifier,
            validator: PdfValidator::new(),
            engine: PdfSigningEngine::new(),
            synthesizer: FallbackDocumentSynthesizer::new(),
        }
    }

    pub fn with_engine(mut self, engine: PdfSigningEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_validator(mut self, validator: PdfValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn verifier(&self) -> &StatusVerifier {
        &self.verifier
    }

    /// Sign `document_id` on behalf of `worker_id`
    ///
    /// `signature` is a PNG/JPEG data URI or typed text; when absent or
    /// trivial, the worker's stored signature is used.
    pub async fn sign_document(
        &self,
        worker_id: &str,
        document_id: &str,
        signature: Option<&str>,
    ) -> Result<SignOutcome, SignError> {
        let document = self
            .records
            .document_for_worker(document_id, worker_id)
            .await?
            .ok_or_else(|| SignError::DocumentNotFound(document_id.to_string()))?;

        match document.status {
            DocumentStatus::Pending => {}
            DocumentStatus::Signed => {
                info!("Document {} already signed, nothing to do", document_id);
                return Ok(SignOutcome::AlreadySigned {
                    document_id: document.id,
                });
            }
            DocumentStatus::Expired => {
                return Err(SignError::DocumentExpired(document.id));
            }
        }

        let signature_data = match signature.filter(|s| !SignaturePayload::is_trivial(s)) {
            Some(explicit) => explicit.to_string(),
            None => self
                .records
                .latest_signature(worker_id)
                .await?
                .map(|record| record.signature_image_ref)
                .filter(|stored| !SignaturePayload::is_trivial(stored))
                .ok_or(SignError::NoSignature)?,
        };

        let signer_name = self
            .records
            .worker_display_name(worker_id)
            .await?
            .unwrap_or_else(|| worker_id.to_string());

        let original = match self.artifacts.load(&document.original_artifact_ref).await {
            Ok(artifact) => Some(artifact.bytes),
            Err(e) if e.is_unavailable() || matches!(e, ArtifactError::Encoding(_)) => {
                warn!(
                    "Original for document {} unavailable ({}), using attestation",
                    document_id, e
                );
                None
            }
            // Storage faults are not a missing original; nothing is committed
            Err(e) => {
                error!("Failed to read original for document {}: {}", document_id, e);
                return Err(SignError::Persistence(format!(
                    "could not read original: {}",
                    e
                )));
            }
        };

        let signed_at = Utc::now();
        let job = ProductionJob {
            original,
            payload: SignaturePayload::parse(&signature_data),
            title: document.title.clone(),
            signer_name,
            signed_at,
        };
        let (validator, engine, synthesizer) = (
            self.validator.clone(),
            self.engine.clone(),
            self.synthesizer.clone(),
        );
        let produced = tokio::task::spawn_blocking(move || {
            produce(&validator, &engine, &synthesizer, job)
        })
        .await
        .map_err(|e| SignError::Processing(format!("signing task failed: {}", e)))?
        .map_err(|e| SignError::Processing(e.to_string()))?;

        let name = format!("signed-{}.pdf", file_stem(document_id));
        let artifact = self
            .artifacts
            .save(&name, &produced.bytes)
            .await
            .map_err(|e| SignError::Persistence(format!("could not store signed file: {}", e)))?;

        let commit = SigningCommit {
            document_id,
            worker_id,
            signature_data: &signature_data,
            artifact_locator: &artifact.locator,
            signed_at,
        };
        let signature_id = match self.records.commit_signing(&commit).await {
            Ok(CommitOutcome::Committed { signature_id }) => signature_id,
            Ok(CommitOutcome::AlreadySigned) => {
                info!("Document {} was signed concurrently", document_id);
                self.discard_orphan(&artifact).await;
                return Ok(SignOutcome::AlreadySigned {
                    document_id: document_id.to_string(),
                });
            }
            Ok(CommitOutcome::NotPending(status)) => {
                self.discard_orphan(&artifact).await;
                return Err(match status {
                    Some(DocumentStatus::Expired) => {
                        SignError::DocumentExpired(document_id.to_string())
                    }
                    _ => SignError::DocumentNotFound(document_id.to_string()),
                });
            }
            Err(e) => {
                error!("Signing commit for {} failed: {}", document_id, e);
                self.discard_orphan(&artifact).await;
                return Err(SignError::Persistence(e.to_string()));
            }
        };

        if let Err(e) = self.verifier.verify(document_id, &artifact).await {
            error!("Verification of signed document {} failed: {}", document_id, e);
            return Err(SignError::Verification(e.to_string()));
        }

        info!(
            "Signed document {} -> {} (fallback: {})",
            document_id,
            artifact.locator,
            produced.fallback_reason.is_some()
        );

        Ok(SignOutcome::Signed(SignReceipt {
            document_id: document_id.to_string(),
            signature_id,
            artifact,
            signed_at,
            used_fallback: produced.fallback_reason.is_some(),
            fallback_reason: produced.fallback_reason,
            strategy: produced.strategy,
            verification_id: produced.verification_id,
        }))
    }

    async fn discard_orphan(&self, artifact: &StoredArtifact) {
        if let Err(e) = self.artifacts.discard(&artifact.locator).await {
            warn!("Could not remove unused artifact {}: {}", artifact.locator, e);
        }
    }
}

fn produce(
    validator: &PdfValidator,
    engine: &PdfSigningEngine,
    synthesizer: &FallbackDocumentSynthesizer,
    job: ProductionJob,
) -> Result<Produced, SigningError> {
    let reason = match job.original.as_deref() {
        None => FallbackReason::ArtifactUnavailable,
        Some(original) => match validator.validate(original) {
            Validation::Malformed => FallbackReason::Malformed,
            Validation::ValidButUnprocessable => FallbackReason::Unprocessable,
            Validation::Processable => {
                let stamp = SignatureStamp::new(job.payload.clone()).with_caption(&job.signer_name);
                match engine.sign_at(original, &stamp, job.signed_at) {
                    SignAttempt::Signed(signed) => {
                        return Ok(Produced {
                            bytes: signed.bytes,
                            strategy: Some(signed.strategy),
                            fallback_reason: None,
                            verification_id: None,
                        });
                    }
                    SignAttempt::StrategiesExhausted(failures) => {
                        for failure in &failures {
                            warn!("Strategy {} failed: {}", failure.strategy, failure.error);
                        }
                        FallbackReason::StrategiesExhausted
                    }
                }
            }
        },
    };

    warn!("Synthesizing attestation for {:?} ({:?})", job.title, reason);
    let attestation = synthesizer.synthesize_at(
        &AttestationRequest {
            document_title: &job.title,
            signer_name: &job.signer_name,
            signature: &job.payload,
        },
        job.signed_at,
    )?;

    Ok(Produced {
        bytes: attestation.bytes,
        strategy: None,
        fallback_reason: Some(reason),
        verification_id: Some(attestation.verification_id),
    })
}

/// Document ids are opaque; keep only characters safe in a file name
fn file_stem(document_id: &str) -> String {
    let stem: String = document_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(64)
        .collect();
    if stem.is_empty() {
        "signed".to_string()
    } else {
        stem
    }
}
