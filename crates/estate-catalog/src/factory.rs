use crate::{CatalogError, CatalogResult, MemoryPhotoCatalog, PgPhotoCatalog, PhotoCatalog};
use estate_core::{CatalogBackend, Config};
use std::sync::Arc;

/// Create the catalog backend selected by configuration
pub async fn create_catalog(config: &Config) -> CatalogResult<Arc<dyn PhotoCatalog>> {
    match config.catalog_backend().unwrap_or(CatalogBackend::Postgres) {
        CatalogBackend::Postgres => {
            let url = config.database_url().ok_or_else(|| {
                CatalogError::ConfigError("DATABASE_URL not configured".to_string())
            })?;
            let catalog = PgPhotoCatalog::connect(
                url,
                config.db_max_connections(),
                config.db_timeout_seconds(),
            )
            .await?;
            Ok(Arc::new(catalog))
        }
        CatalogBackend::Memory => {
            tracing::warn!("Using in-memory photo catalog; photo lists will not survive a restart");
            Ok(Arc::new(MemoryPhotoCatalog::new()))
        }
    }
}
