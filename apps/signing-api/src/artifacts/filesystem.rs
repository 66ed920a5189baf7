//! Artifacts stored as files under a document root

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use super::{Artifact, ArtifactBackend, ArtifactError, BackendKind, PDF_CONTENT_TYPE, SIGNED_DIR};

#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path for a locator, refusing anything that escapes the root
    pub fn resolve(&self, locator: &str) -> Result<PathBuf, ArtifactError> {
        let invalid = || ArtifactError::InvalidLocator(locator.to_string());

        if locator.is_empty() || locator.starts_with('/') || locator.starts_with('\\') {
            return Err(invalid());
        }
        if locator.split(['/', '\\']).any(|segment| segment.is_empty()) {
            return Err(invalid());
        }

        let relative = Path::new(locator);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid());
        }

        Ok(self.root.join(relative))
    }

    fn content_type_of(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => PDF_CONTENT_TYPE,
            Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
            _ => "application/octet-stream",
        }
    }
}

/// Single path component, safe to place inside `SIGNED_DIR`
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait]
impl ArtifactBackend for FilesystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    async fn save(
        &self,
        name: &str,
        _content_type: &str,
        bytes: &[u8],
    ) -> Result<String, ArtifactError> {
        // Fresh prefix per save, so an issued locator never points at other bytes
        let locator = format!("{}/{}-{}", SIGNED_DIR, Uuid::new_v4(), sanitize_name(name));
        let path = self.resolve(&locator)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers never see a half-written file
        let partial = path.with_extension("part");
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &path).await?;

        Ok(locator)
    }

    async fn load(&self, locator: &str) -> Result<Artifact, ArtifactError> {
        let path = self.resolve(locator)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArtifactError::Unavailable(locator.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Artifact {
            backend: BackendKind::Filesystem,
            locator: locator.to_string(),
            bytes,
            content_type: Self::content_type_of(&path).to_string(),
        })
    }

    async fn discard(&self, locator: &str) -> Result<(), ArtifactError> {
        let path = self.resolve(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
