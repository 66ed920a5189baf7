//! Signing API - persistence and orchestration for document signing
//!
//! Provides:
//! - [`artifacts::ArtifactStore`] over a database blob table or a document root
//! - [`coordinator::SignatureRecordCoordinator`], one signing transaction end to end
//! - [`verifier::StatusVerifier`], the post-commit consistency check
//! - an axum [`router`] exposing signing over HTTP

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod artifacts;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod records;
pub mod state;
pub mod verifier;

pub use artifacts::{ArtifactBackend, ArtifactError, ArtifactStore, BackendKind, StoredArtifact};
pub use config::{Config, StorageMode};
pub use coordinator::{FallbackReason, SignOutcome, SignReceipt, SignatureRecordCoordinator};
pub use error::{ApiError, SignError};
pub use records::{CommitOutcome, RecordError, RecordStore, SigningCommit};
pub use state::AppState;
pub use verifier::{StatusVerifier, VerificationError};

pub fn router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Signing
        .route("/api/documents/:id/sign", post(handlers::sign_document))
        .route("/api/documents/:id/signed", get(handlers::get_signed_document))
        .route("/api/signatures", put(handlers::save_signature))
        // Blob-backed artifacts
        .route("/api/files/:id", get(handlers::get_file))
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
