//! Records and wire types for the signing service

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Document status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Signed,
    Expired,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Signed => "signed",
            DocumentStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "signed" => Ok(DocumentStatus::Signed),
            "expired" => Ok(DocumentStatus::Expired),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// Document row as stored
#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub original_artifact_ref: String,
    pub status: String,
    pub owner_admin_id: String,
    pub assigned_worker_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub original_artifact_ref: String,
    pub status: DocumentStatus,
    pub owner_admin_id: String,
    pub assigned_worker_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbDocument> for Document {
    type Error = String;

    fn try_from(row: DbDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse()?,
            id: row.id,
            title: row.title,
            description: row.description,
            original_artifact_ref: row.original_artifact_ref,
            owner_admin_id: row.owner_admin_id,
            assigned_worker_id: row.assigned_worker_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A worker's reusable signature (data URI or typed text)
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
    pub id: String,
    pub worker_id: String,
    pub signature_image_ref: String,
    pub updated_at: DateTime<Utc>,
}

/// Join row linking a signed document to its signature and artifact
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSignature {
    pub document_id: String,
    pub worker_id: String,
    pub signature_id: String,
    pub signed_artifact_ref: String,
    pub signed_at: DateTime<Utc>,
}

/// Document status joined with its signature row, if any
#[derive(Debug, Clone, FromRow)]
pub struct DbSignedView {
    pub document_id: String,
    pub status: String,
    pub worker_id: Option<String>,
    pub signature_id: Option<String>,
    pub signed_artifact_ref: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedView {
    pub document_id: String,
    pub status: DocumentStatus,
    pub signature: Option<DocumentSignature>,
}

impl TryFrom<DbSignedView> for SignedView {
    type Error = String;

    fn try_from(row: DbSignedView) -> Result<Self, Self::Error> {
        let signature = match (
            row.worker_id,
            row.signature_id,
            row.signed_artifact_ref,
            row.signed_at,
        ) {
            (Some(worker_id), Some(signature_id), Some(signed_artifact_ref), Some(signed_at)) => {
                Some(DocumentSignature {
                    document_id: row.document_id.clone(),
                    worker_id,
                    signature_id,
                    signed_artifact_ref,
                    signed_at,
                })
            }
            _ => None,
        };
        Ok(Self {
            status: row.status.parse()?,
            document_id: row.document_id,
            signature,
        })
    }
}

/// Request body for signing a document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignRequest {
    /// PNG data URI or typed text; omitted to reuse the stored signature
    #[serde(default)]
    pub signature: Option<String>,
}

/// Response from the signing endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    pub success: bool,
    pub document_id: String,
    pub status: String,
    pub used_fallback: bool,
    pub artifact_locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request body for storing a reusable signature
#[derive(Debug, Clone, Deserialize)]
pub struct SaveSignatureRequest {
    pub signature: String,
}
