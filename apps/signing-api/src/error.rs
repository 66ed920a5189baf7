//! Error types for the signing service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::records::RecordError;

/// Caller-visible failures of a signing call
///
/// `AlreadySigned` is not here: losing a race is a normal outcome, reported
/// through `SignOutcome`.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("No signature supplied and none on file")]
    NoSignature,

    #[error("Document has expired: {0}")]
    DocumentExpired(String),

    #[error("Could not produce a signed document: {0}")]
    Processing(String),

    #[error("Failed to persist signing: {0}")]
    Persistence(String),

    #[error("Signed state failed verification: {0}")]
    Verification(String),
}

impl SignError {
    pub fn code(&self) -> &'static str {
        match self {
            SignError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            SignError::NoSignature => "NO_SIGNATURE",
            SignError::DocumentExpired(_) => "DOCUMENT_EXPIRED",
            SignError::Processing(_) => "PROCESSING_FAILURE",
            SignError::Persistence(_) => "PERSISTENCE_FAILURE",
            SignError::Verification(_) => "VERIFICATION_FAILURE",
        }
    }

    /// Rejected before any write happened
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SignError::DocumentNotFound(_) | SignError::NoSignature | SignError::DocumentExpired(_)
        )
    }
}

impl From<RecordError> for SignError {
    fn from(err: RecordError) -> Self {
        SignError::Persistence(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Sign(#[from] SignError),

    #[error("Missing worker identity")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Database error: {0}")]
    Records(#[from] RecordError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Sign(e) => {
                let status = match e {
                    SignError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
                    SignError::NoSignature | SignError::DocumentExpired(_) => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    SignError::Processing(_)
                    | SignError::Persistence(_)
                    | SignError::Verification(_) => {
                        tracing::error!("Signing failed: {}", e);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.code(), e.to_string())
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing x-worker-id header".to_string(),
            ),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            ApiError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone())
            }
            ApiError::Artifact(e) if e.is_unavailable() => (
                StatusCode::NOT_FOUND,
                "ARTIFACT_UNAVAILABLE",
                "Artifact not available".to_string(),
            ),
            ApiError::Artifact(e) => {
                tracing::error!("Artifact error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ARTIFACT_ERROR",
                    "Artifact error".to_string(),
                )
            }
            ApiError::Records(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
