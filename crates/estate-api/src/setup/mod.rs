//! Application setup and initialization

pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use estate_core::Config;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    crate::telemetry::init_telemetry(config.log_format())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let storage = estate_storage::create_storage(&config)
        .await
        .context("Failed to initialize object storage")?;

    let catalog = estate_catalog::create_catalog(&config)
        .await
        .context("Failed to initialize photo catalog")?;

    tracing::info!(
        storage = %storage.backend_type(),
        catalog = catalog.backend_name(),
        "Backends initialized"
    );

    let state = Arc::new(AppState::new(&config, storage, catalog));
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
