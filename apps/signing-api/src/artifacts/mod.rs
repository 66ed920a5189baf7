//! Artifact storage behind two interchangeable backends
//!
//! New writes go to the backend selected at startup. Reads dispatch on the
//! locator's shape, so artifacts written under either mode stay readable:
//! locators starting with [`BLOB_LOCATOR_PREFIX`] live in the database,
//! everything else is a path relative to the artifact root.

mod blob;
mod filesystem;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::config::StorageMode;

pub use blob::BlobBackend;
pub use filesystem::FilesystemBackend;

/// Blob-backed locators are served by the API under this path
pub const BLOB_LOCATOR_PREFIX: &str = "/api/files/";

/// Filesystem locators for signed output, relative to the artifact root
pub const SIGNED_DIR: &str = "uploads/signed";

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Blob,
    Filesystem,
}

impl BackendKind {
    /// Which backend a locator belongs to, from its shape alone
    pub fn of_locator(locator: &str) -> Self {
        if locator.starts_with(BLOB_LOCATOR_PREFIX) {
            BackendKind::Blob
        } else {
            BackendKind::Filesystem
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Blob => "blob",
            BackendKind::Filesystem => "filesystem",
        }
    }
}

impl From<StorageMode> for BackendKind {
    fn from(mode: StorageMode) -> Self {
        match mode {
            StorageMode::Managed => BackendKind::Blob,
            StorageMode::Local => BackendKind::Filesystem,
        }
    }
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid artifact locator: {0}")]
    InvalidLocator(String),

    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Artifact encoding error: {0}")]
    Encoding(String),
}

impl ArtifactError {
    /// The locator does not resolve to anything readable
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ArtifactError::Unavailable(_) | ArtifactError::InvalidLocator(_)
        )
    }
}

/// Loaded artifact bytes and where they came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub backend: BackendKind,
    pub locator: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Receipt for a completed save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    pub backend: BackendKind,
    pub locator: String,
    pub sha256: String,
    pub size: usize,
}

#[async_trait]
pub trait ArtifactBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Persist `bytes` and return the locator that reads them back
    async fn save(&self, name: &str, content_type: &str, bytes: &[u8])
        -> Result<String, ArtifactError>;

    async fn load(&self, locator: &str) -> Result<Artifact, ArtifactError>;

    /// Remove an artifact; removing something already gone is not an error
    async fn discard(&self, locator: &str) -> Result<(), ArtifactError>;
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Clone)]
pub struct ArtifactStore {
    active: BackendKind,
    blob: Arc<dyn ArtifactBackend>,
    filesystem: Arc<dyn ArtifactBackend>,
}

impl ArtifactStore {
    pub fn new(
        active: BackendKind,
        blob: Arc<dyn ArtifactBackend>,
        filesystem: Arc<dyn ArtifactBackend>,
    ) -> Self {
        Self {
            active,
            blob,
            filesystem,
        }
    }

    /// Both backends wired up, writes going where `mode` says
    pub fn for_mode(mode: StorageMode, pool: SqlitePool, root: impl Into<PathBuf>) -> Self {
        Self::new(
            mode.into(),
            Arc::new(BlobBackend::new(pool)),
            Arc::new(FilesystemBackend::new(root)),
        )
    }

    pub fn active_kind(&self) -> BackendKind {
        self.active
    }

    fn backend(&self, kind: BackendKind) -> &dyn ArtifactBackend {
        match kind {
            BackendKind::Blob => self.blob.as_ref(),
            BackendKind::Filesystem => self.filesystem.as_ref(),
        }
    }

    pub async fn save(&self, name: &str, bytes: &[u8]) -> Result<StoredArtifact, ArtifactError> {
        self.save_as(name, PDF_CONTENT_TYPE, bytes).await
    }

    pub async fn save_as(
        &self,
        name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, ArtifactError> {
        let locator = self
            .backend(self.active)
            .save(name, content_type, bytes)
            .await?;

        tracing::debug!(
            "Stored {} bytes as {} ({})",
            bytes.len(),
            locator,
            self.active.as_str()
        );

        Ok(StoredArtifact {
            backend: self.active,
            locator,
            sha256: sha256_hex(bytes),
            size: bytes.len(),
        })
    }

    pub async fn load(&self, locator: &str) -> Result<Artifact, ArtifactError> {
        self.backend(BackendKind::of_locator(locator))
            .load(locator)
            .await
    }

    pub async fn discard(&self, locator: &str) -> Result<(), ArtifactError> {
        self.backend(BackendKind::of_locator(locator))
            .discard(locator)
            .await
    }
}
