//! Document, worker and signature records
//!
//! All SQL for the signing transaction lives here. The coordinator only sees
//! typed outcomes, never raw rows.

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    DbDocument, DbSignedView, Document, DocumentStatus, SignatureRecord, SignedView,
};

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Everything the status flip needs, written in one transaction
#[derive(Debug, Clone)]
pub struct SigningCommit<'a> {
    pub document_id: &'a str,
    pub worker_id: &'a str,
    /// Stored as the worker's signature only when they have none yet
    pub signature_data: &'a str,
    pub artifact_locator: &'a str,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { signature_id: String },
    /// Another call flipped the document first; nothing was written
    AlreadySigned,
    /// The document left `pending` some other way (expired, or deleted when `None`)
    NotPending(Option<DocumentStatus>),
}

#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Document assigned to `worker_id`, or `None` if absent or assigned elsewhere
    pub async fn document_for_worker(
        &self,
        document_id: &str,
        worker_id: &str,
    ) -> Result<Option<Document>, RecordError> {
        let row = sqlx::query_as::<_, DbDocument>(
            r#"
            SELECT id, title, description, original_artifact_ref, status,
                   owner_admin_id, assigned_worker_id, created_at, updated_at
            FROM documents
            WHERE id = ? AND assigned_worker_id = ?
            "#,
        )
        .bind(document_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Document::try_from)
            .transpose()
            .map_err(RecordError::Corrupt)
    }

    pub async fn worker_display_name(&self, worker_id: &str) -> Result<Option<String>, RecordError> {
        let name: Option<(String,)> =
            sqlx::query_as("SELECT display_name FROM workers WHERE id = ?")
                .bind(worker_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(name
            .map(|(n,)| n)
            .filter(|n| !n.trim().is_empty()))
    }

    pub async fn latest_signature(
        &self,
        worker_id: &str,
    ) -> Result<Option<SignatureRecord>, RecordError> {
        let record = sqlx::query_as::<_, SignatureRecord>(
            r#"
            SELECT id, worker_id, signature_image_ref, updated_at
            FROM signature_records
            WHERE worker_id = ?
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Store (or replace) the worker's reusable signature
    pub async fn save_signature(
        &self,
        worker_id: &str,
        signature_data: &str,
    ) -> Result<SignatureRecord, RecordError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO signature_records (id, worker_id, signature_image_ref, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(worker_id) DO UPDATE SET
                signature_image_ref = excluded.signature_image_ref,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(worker_id)
        .bind(signature_data)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::info!("Saved signature for worker {}", worker_id);

        self.latest_signature(worker_id)
            .await?
            .ok_or_else(|| RecordError::Corrupt(format!("signature for {} vanished", worker_id)))
    }

    pub async fn document_status(
        &self,
        document_id: &str,
    ) -> Result<Option<DocumentStatus>, RecordError> {
        let status: Option<(String,)> = sqlx::query_as("SELECT status FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        status
            .map(|(s,)| s.parse().map_err(RecordError::Corrupt))
            .transpose()
    }

    /// Document joined with its signature row
    pub async fn signed_view(&self, document_id: &str) -> Result<Option<SignedView>, RecordError> {
        let row = sqlx::query_as::<_, DbSignedView>(
            r#"
            SELECT d.id AS document_id, d.status,
                   ds.worker_id, ds.signature_id, ds.signed_artifact_ref, ds.signed_at
            FROM documents d
            LEFT JOIN document_signatures ds ON ds.document_id = d.id
            WHERE d.id = ?
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SignedView::try_from)
            .transpose()
            .map_err(RecordError::Corrupt)
    }

    /// Flip the document to `signed` and link the signature and artifact, all or nothing
    ///
    /// The conditional status update runs first, so the loser of a race sees
    /// zero affected rows before touching anything else.
    pub async fn commit_signing(
        &self,
        commit: &SigningCommit<'_>,
    ) -> Result<CommitOutcome, RecordError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::write_commit(&mut conn, commit).await {
            Ok(CommitOutcome::Committed { signature_id }) => {
                if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
                    Self::rollback(conn).await;
                    return Err(e.into());
                }
                Ok(CommitOutcome::Committed { signature_id })
            }
            Ok(outcome) => {
                Self::rollback(conn).await;
                Ok(outcome)
            }
            Err(e) => {
                Self::rollback(conn).await;
                Err(e)
            }
        }
    }

    async fn write_commit(
        conn: &mut PoolConnection<Sqlite>,
        commit: &SigningCommit<'_>,
    ) -> Result<CommitOutcome, RecordError> {
        let signed_at = commit.signed_at.to_rfc3339();

        let flipped = sqlx::query(
            r#"
            UPDATE documents SET status = 'signed', updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&signed_at)
        .bind(commit.document_id)
        .execute(&mut **conn)
        .await?;

        if flipped.rows_affected() == 0 {
            let status: Option<(String,)> =
                sqlx::query_as("SELECT status FROM documents WHERE id = ?")
                    .bind(commit.document_id)
                    .fetch_optional(&mut **conn)
                    .await?;
            let status = status
                .map(|(s,)| s.parse::<DocumentStatus>().map_err(RecordError::Corrupt))
                .transpose()?;
            return Ok(match status {
                Some(DocumentStatus::Signed) => CommitOutcome::AlreadySigned,
                other => CommitOutcome::NotPending(other),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO signature_records (id, worker_id, signature_image_ref, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(worker_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(commit.worker_id)
        .bind(commit.signature_data)
        .bind(&signed_at)
        .execute(&mut **conn)
        .await?;

        let (signature_id,): (String,) =
            sqlx::query_as("SELECT id FROM signature_records WHERE worker_id = ?")
                .bind(commit.worker_id)
                .fetch_one(&mut **conn)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO document_signatures
                (document_id, worker_id, signature_id, signed_artifact_ref, signed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                worker_id = excluded.worker_id,
                signature_id = excluded.signature_id,
                signed_artifact_ref = excluded.signed_artifact_ref,
                signed_at = excluded.signed_at
            "#,
        )
        .bind(commit.document_id)
        .bind(commit.worker_id)
        .bind(&signature_id)
        .bind(commit.artifact_locator)
        .bind(&signed_at)
        .execute(&mut **conn)
        .await?;

        Ok(CommitOutcome::Committed { signature_id })
    }

    async fn rollback(mut conn: PoolConnection<Sqlite>) {
        if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            // Never hand a connection with an open transaction back to the pool
            tracing::error!("Rollback failed, closing connection: {}", e);
            let _ = conn.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn store() -> RecordStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, original_artifact_ref, status,
                                   owner_admin_id, assigned_worker_id, created_at, updated_at)
            VALUES ('doc-1', 'Contrato.pdf', 'uploads/original.pdf', 'pending',
                    'admin-1', 'worker-1', ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();
        RecordStore::new(pool)
    }

    fn commit<'a>() -> SigningCommit<'a> {
        SigningCommit {
            document_id: "doc-1",
            worker_id: "worker-1",
            signature_data: "Ana Lima",
            artifact_locator: "uploads/signed/doc-1.pdf",
            signed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_document_scoped_to_assigned_worker() {
        let store = store().await;
        assert!(store.document_for_worker("doc-1", "worker-1").await.unwrap().is_some());
        assert!(store.document_for_worker("doc-1", "worker-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_then_already_signed() {
        let store = store().await;

        let first = store.commit_signing(&commit()).await.unwrap();
        let signature_id = match first {
            CommitOutcome::Committed { signature_id } => signature_id,
            other => panic!("expected commit, got {:?}", other),
        };

        let mut again = commit();
        again.artifact_locator = "uploads/signed/other.pdf";
        assert_eq!(store.commit_signing(&again).await.unwrap(), CommitOutcome::AlreadySigned);

        let view = store.signed_view("doc-1").await.unwrap().unwrap();
        assert_eq!(view.status, DocumentStatus::Signed);
        let join = view.signature.unwrap();
        assert_eq!(join.signature_id, signature_id);
        assert_eq!(join.signed_artifact_ref, "uploads/signed/doc-1.pdf");
    }

    #[tokio::test]
    async fn test_commit_keeps_existing_signature_record() {
        let store = store().await;
        let saved = store.save_signature("worker-1", "Stored Name").await.unwrap();

        let outcome = store.commit_signing(&commit()).await.unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Committed {
                signature_id: saved.id.clone()
            }
        );
        let latest = store.latest_signature("worker-1").await.unwrap().unwrap();
        assert_eq!(latest.signature_image_ref, "Stored Name");
    }

    #[tokio::test]
    async fn test_commit_on_missing_document() {
        let store = store().await;
        let mut c = commit();
        c.document_id = "doc-404";
        assert_eq!(store.commit_signing(&c).await.unwrap(), CommitOutcome::NotPending(None));
    }

    #[tokio::test]
    async fn test_save_signature_replaces() {
        let store = store().await;
        let first = store.save_signature("worker-1", "First").await.unwrap();
        let second = store.save_signature("worker-1", "Second").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.signature_image_ref, "Second");
    }

    #[tokio::test]
    async fn test_unknown_worker_has_no_display_name() {
        let store = store().await;
        assert_eq!(store.worker_display_name("nobody").await.unwrap(), None);
    }
}
