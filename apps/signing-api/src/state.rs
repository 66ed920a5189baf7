//! Application state for the signing API

use anyhow::Result;
use signing_core::{PdfSigningEngine, PdfValidator};
use sqlx::SqlitePool;

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::coordinator::SignatureRecordCoordinator;
use crate::db;
use crate::records::RecordStore;

pub struct AppState {
    pub config: Config,
    pub records: RecordStore,
    pub artifacts: ArtifactStore,
    pub coordinator: SignatureRecordCoordinator,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let pool = db::connect(&config.database_url, config.max_connections).await?;
        Ok(Self::from_pool(config, pool))
    }

    /// Wire services over an already-migrated pool
    pub fn from_pool(config: Config, pool: SqlitePool) -> Self {
        let records = RecordStore::new(pool.clone());
        let artifacts = ArtifactStore::for_mode(config.storage_mode, pool, config.artifact_root.clone());

        tracing::info!(
            "Artifact backend: {} (root {})",
            artifacts.active_kind().as_str(),
            config.artifact_root.display()
        );

        let coordinator = SignatureRecordCoordinator::new(records.clone(), artifacts.clone())
            .with_validator(PdfValidator::new().with_parse_timeout(config.strategy_timeout))
            .with_engine(PdfSigningEngine::new().with_strategy_timeout(config.strategy_timeout));

        Self {
            config,
            records,
            artifacts,
            coordinator,
        }
    }
}
