use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Durable record of each entity's ordered photo keys.
#[async_trait]
pub trait PhotoCatalog: Send + Sync {
    /// Current photo keys of an entity. Unknown entities have none.
    async fn get_photo_keys(&self, entity_id: &str) -> CatalogResult<Vec<String>>;

    /// Replace the photo keys of an entity.
    async fn set_photo_keys(&self, entity_id: &str, keys: &[String]) -> CatalogResult<()>;

    /// Cheap reachability probe for health checks.
    async fn health_check(&self) -> CatalogResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str;
}
