//! Signing API server
//!
//! Provides REST endpoints for:
//! - Signing an assigned document
//! - Storing a worker's reusable signature
//! - Downloading signed documents and blob-backed files

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use signing_api::{router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("signing_api=info".parse()?)
                .add_directive("signing_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = Config::from_env()?;

    // Initialize application state
    info!("Initializing signing API...");
    let port = config.port;
    let state = Arc::new(AppState::new(config).await?);

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting signing API on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
