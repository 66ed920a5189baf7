//! HTTP handlers for the signing API

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};

use crate::artifacts::BLOB_LOCATOR_PREFIX;
use crate::coordinator::SignOutcome;
use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

/// Header carrying the authenticated worker; session lookup happens upstream
pub const WORKER_HEADER: &str = "x-worker-id";

fn worker_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(WORKER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Sign a document with the supplied or stored signature
pub async fn sign_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SignRequest>,
) -> Result<Json<SignResponse>, ApiError> {
    let worker = worker_id(&headers)?;

    let outcome = state
        .coordinator
        .sign_document(&worker, &document_id, req.signature.as_deref())
        .await?;

    let response = match outcome {
        SignOutcome::Signed(receipt) => SignResponse {
            success: true,
            status: DocumentStatus::Signed.to_string(),
            used_fallback: receipt.used_fallback,
            artifact_locator: Some(receipt.artifact.locator),
            strategy: receipt.strategy.map(|s| s.to_string()),
            error: None,
            document_id: receipt.document_id,
        },
        SignOutcome::AlreadySigned { document_id } => SignResponse {
            success: false,
            status: "already_signed".to_string(),
            used_fallback: false,
            artifact_locator: None,
            strategy: None,
            error: Some("Document is already signed".to_string()),
            document_id,
        },
    };

    Ok(Json(response))
}

/// Store the caller's reusable signature
pub async fn save_signature(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SaveSignatureRequest>,
) -> Result<Json<SignatureRecord>, ApiError> {
    let worker = worker_id(&headers)?;

    if signing_core::SignaturePayload::is_trivial(&req.signature) {
        return Err(ApiError::InvalidRequest("Signature is empty".to_string()));
    }

    let record = state.records.save_signature(&worker, &req.signature).await?;
    Ok(Json(record))
}

/// Download the signed artifact of a document assigned to the caller
pub async fn get_signed_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let worker = worker_id(&headers)?;

    state
        .records
        .document_for_worker(&document_id, &worker)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document {}", document_id)))?;

    let signature = state
        .records
        .signed_view(&document_id)
        .await?
        .and_then(|view| view.signature)
        .ok_or_else(|| ApiError::NotFound(format!("signed copy of {}", document_id)))?;

    let artifact = state.artifacts.load(&signature.signed_artifact_ref).await?;

    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}-signed.pdf\"", document_id),
            ),
        ],
        artifact.bytes,
    )
        .into_response())
}

/// Serve a blob-backed artifact by id
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let artifact = state
        .artifacts
        .load(&format!("{}{}", BLOB_LOCATOR_PREFIX, id))
        .await?;

    Ok(([(header::CONTENT_TYPE, artifact.content_type)], artifact.bytes).into_response())
}
