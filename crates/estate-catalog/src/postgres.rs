use crate::traits::{CatalogResult, PhotoCatalog};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::time::Duration;

/// Catalog backed by the `property_photos` table.
#[derive(Clone)]
pub struct PgPhotoCatalog {
    pool: PgPool,
}

impl PgPhotoCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool and apply the embedded migrations.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        timeout_seconds: u64,
    ) -> CatalogResult<Self> {
        tracing::info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(timeout_seconds))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "Database connected successfully");

        let catalog = Self::new(pool);
        catalog.run_migrations().await?;
        Ok(catalog)
    }

    pub async fn run_migrations(&self) -> CatalogResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PhotoCatalog for PgPhotoCatalog {
    #[tracing::instrument(skip(self), fields(db.table = "property_photos", db.operation = "select"))]
    async fn get_photo_keys(&self, entity_id: &str) -> CatalogResult<Vec<String>> {
        let keys = sqlx::query_scalar::<Postgres, Vec<String>>(
            "SELECT photo_keys FROM property_photos WHERE entity_id = $1",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(keys.unwrap_or_default())
    }

    #[tracing::instrument(skip(self, keys), fields(db.table = "property_photos", db.operation = "upsert", count = keys.len()))]
    async fn set_photo_keys(&self, entity_id: &str, keys: &[String]) -> CatalogResult<()> {
        sqlx::query(
            r#"
            INSERT INTO property_photos (entity_id, photo_keys, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (entity_id)
            DO UPDATE SET photo_keys = EXCLUDED.photo_keys, updated_at = NOW()
            "#,
        )
        .bind(entity_id)
        .bind(keys)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn health_check(&self) -> CatalogResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Requires a reachable PostgreSQL in `TEST_DATABASE_URL`.
    #[tokio::test]
    #[ignore]
    async fn test_round_trip_against_postgres() {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL not set");
        let catalog = PgPhotoCatalog::connect(&url, 2, 5).await.unwrap();

        let entity = format!("test-{}", std::process::id());
        assert!(catalog.get_photo_keys(&entity).await.unwrap().is_empty());

        let keys = vec!["b".to_string(), "a".to_string()];
        catalog.set_photo_keys(&entity, &keys).await.unwrap();
        assert_eq!(catalog.get_photo_keys(&entity).await.unwrap(), keys);

        catalog.set_photo_keys(&entity, &[]).await.unwrap();
        assert!(catalog.get_photo_keys(&entity).await.unwrap().is_empty());
    }
}
