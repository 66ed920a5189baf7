//! Artifacts stored base64-encoded in the `stored_files` table

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{sha256_hex, Artifact, ArtifactBackend, ArtifactError, BackendKind, BLOB_LOCATOR_PREFIX};

#[derive(Clone)]
pub struct BlobBackend {
    pool: SqlitePool,
}

impl BlobBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn id_of(locator: &str) -> Result<&str, ArtifactError> {
        locator
            .strip_prefix(BLOB_LOCATOR_PREFIX)
            .filter(|id| !id.is_empty() && !id.contains('/'))
            .ok_or_else(|| ArtifactError::InvalidLocator(locator.to_string()))
    }
}

#[async_trait]
impl ArtifactBackend for BlobBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Blob
    }

    async fn save(
        &self,
        name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<String, ArtifactError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO stored_files (id, name, content_type, data_base64, sha256, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(content_type)
        .bind(STANDARD.encode(bytes))
        .bind(sha256_hex(bytes))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(format!("{}{}", BLOB_LOCATOR_PREFIX, id))
    }

    async fn load(&self, locator: &str) -> Result<Artifact, ArtifactError> {
        let id = Self::id_of(locator)?;

        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT content_type, data_base64, sha256 FROM stored_files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (content_type, data, expected) =
            row.ok_or_else(|| ArtifactError::Unavailable(locator.to_string()))?;

        let bytes = STANDARD
            .decode(data.as_bytes())
            .map_err(|e| ArtifactError::Encoding(format!("{}: {}", locator, e)))?;

        if sha256_hex(&bytes) != expected {
            return Err(ArtifactError::Encoding(format!(
                "{}: checksum mismatch",
                locator
            )));
        }

        Ok(Artifact {
            backend: BackendKind::Blob,
            locator: locator.to_string(),
            bytes,
            content_type,
        })
    }

    async fn discard(&self, locator: &str) -> Result<(), ArtifactError> {
        let id = Self::id_of(locator)?;
        sqlx::query("DELETE FROM stored_files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_of_rejects_nested_paths() {
        assert_eq!(BlobBackend::id_of("/api/files/abc").unwrap(), "abc");
        assert!(BlobBackend::id_of("/api/files/").is_err());
        assert!(BlobBackend::id_of("/api/files/a/b").is_err());
        assert!(BlobBackend::id_of("uploads/a.pdf").is_err());
    }
}
