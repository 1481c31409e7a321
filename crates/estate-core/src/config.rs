//! Configuration module
//!
//! Configuration for the photo service: HTTP server, object store, catalog,
//! and the sync/sweep tuning knobs. Everything is read from the environment
//! (optionally seeded from a `.env` file) and validated once at startup.

use std::env;
use std::time::Duration;

use crate::storage_types::{CatalogBackend, StorageBackend};

// Common constants
const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_PHOTO_SIZE_MB: usize = 15;
const MAX_REQUEST_SIZE_MB: usize = 100;
const S3_MAX_ATTEMPTS: u32 = 3;
const STORAGE_PAGE_SIZE: usize = 1000;
const SYNC_MAX_CONCURRENCY: usize = 8;
const SYNC_OPERATION_TIMEOUT_SECS: u64 = 30;
const SYNC_BUDGET_SECS: u64 = 120;
const SWEEP_CONCURRENCY: usize = 16;

/// Upper bound on concurrent object-store calls from one invocation.
pub const MAX_STORE_CONCURRENCY: usize = 20;

/// Base configuration for the HTTP service
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub log_format: String,
    pub max_request_size_bytes: usize,
}

/// Photo service configuration
#[derive(Clone, Debug)]
pub struct PhotoServiceConfig {
    pub base: BaseConfig,
    // Object store configuration
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub s3_max_attempts: u32,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub storage_page_size: usize,
    // Catalog configuration
    pub catalog_backend: Option<CatalogBackend>,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Photo sync configuration
    pub photo_key_prefix: String,
    pub max_photo_size_bytes: usize,
    pub allowed_photo_content_types: Vec<String>,
    pub sync_max_concurrency: usize,
    pub sync_operation_timeout_secs: u64,
    pub sync_budget_secs: u64,
    // Maintenance sweeps
    pub sweep_concurrency: usize,
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config(pub Box<PhotoServiceConfig>);

impl Config {
    fn inner(&self) -> &PhotoServiceConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = PhotoServiceConfig::from_lookup(lookup)?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn log_format(&self) -> &str {
        &self.inner().base.log_format
    }

    pub fn max_request_size_bytes(&self) -> usize {
        self.inner().base.max_request_size_bytes
    }

    pub fn storage_backend(&self) -> Option<StorageBackend> {
        self.inner().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.inner().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.inner().aws_region.as_deref()
    }

    pub fn s3_max_attempts(&self) -> u32 {
        self.inner().s3_max_attempts
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.inner().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.inner().local_storage_base_url.as_deref()
    }

    pub fn storage_page_size(&self) -> usize {
        self.inner().storage_page_size
    }

    pub fn catalog_backend(&self) -> Option<CatalogBackend> {
        self.inner().catalog_backend
    }

    pub fn database_url(&self) -> Option<&str> {
        self.inner().database_url.as_deref()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().db_timeout_seconds
    }

    pub fn photo_key_prefix(&self) -> &str {
        &self.inner().photo_key_prefix
    }

    pub fn max_photo_size_bytes(&self) -> usize {
        self.inner().max_photo_size_bytes
    }

    pub fn allowed_photo_content_types(&self) -> &[String] {
        &self.inner().allowed_photo_content_types
    }

    pub fn sync_max_concurrency(&self) -> usize {
        self.inner().sync_max_concurrency
    }

    pub fn sync_operation_timeout(&self) -> Duration {
        Duration::from_secs(self.inner().sync_operation_timeout_secs)
    }

    pub fn sync_budget(&self) -> Duration {
        Duration::from_secs(self.inner().sync_budget_secs)
    }

    pub fn sweep_concurrency(&self) -> usize {
        self.inner().sweep_concurrency
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn csv_lowercase(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl PhotoServiceConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let cors_origins_str = lookup("CORS_ORIGINS").unwrap_or_else(|| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let server_port = match lookup("PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            None => SERVER_PORT,
        };

        let base = BaseConfig {
            server_port,
            cors_origins,
            environment,
            log_format: lookup("LOG_FORMAT")
                .unwrap_or_else(|| "compact".to_string())
                .to_lowercase(),
            max_request_size_bytes: parse_or(&lookup, "MAX_REQUEST_SIZE_MB", MAX_REQUEST_SIZE_MB)
                .saturating_mul(1024 * 1024),
        };

        let storage_backend = match non_empty(&lookup, "STORAGE_BACKEND") {
            Some(s) => Some(s.parse::<StorageBackend>()?),
            None => None,
        };

        let catalog_backend = match non_empty(&lookup, "CATALOG_BACKEND") {
            Some(s) => Some(s.parse::<CatalogBackend>()?),
            None => None,
        };

        let allowed_photo_content_types = csv_lowercase(
            &lookup("ALLOWED_PHOTO_CONTENT_TYPES").unwrap_or_else(|| {
                "image/jpeg,image/png,image/webp,image/gif,image/heic,image/heif,application/octet-stream"
                    .to_string()
            }),
        );

        let config = PhotoServiceConfig {
            base,
            storage_backend,
            s3_bucket: non_empty(&lookup, "S3_BUCKET"),
            s3_region: non_empty(&lookup, "S3_REGION"),
            s3_endpoint: non_empty(&lookup, "S3_ENDPOINT"),
            aws_region: non_empty(&lookup, "AWS_REGION"),
            s3_max_attempts: parse_or(&lookup, "S3_MAX_ATTEMPTS", S3_MAX_ATTEMPTS),
            local_storage_path: non_empty(&lookup, "LOCAL_STORAGE_PATH"),
            local_storage_base_url: non_empty(&lookup, "LOCAL_STORAGE_BASE_URL"),
            storage_page_size: parse_or(&lookup, "STORAGE_PAGE_SIZE", STORAGE_PAGE_SIZE),
            catalog_backend,
            database_url: non_empty(&lookup, "DATABASE_URL"),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(&lookup, "DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            photo_key_prefix: lookup("PHOTO_KEY_PREFIX")
                .map(|s| s.trim().trim_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "properties".to_string()),
            max_photo_size_bytes: parse_or(&lookup, "MAX_PHOTO_SIZE_MB", MAX_PHOTO_SIZE_MB)
                .saturating_mul(1024 * 1024),
            allowed_photo_content_types,
            sync_max_concurrency: parse_or(&lookup, "SYNC_MAX_CONCURRENCY", SYNC_MAX_CONCURRENCY),
            sync_operation_timeout_secs: parse_or(
                &lookup,
                "SYNC_OPERATION_TIMEOUT_SECS",
                SYNC_OPERATION_TIMEOUT_SECS,
            ),
            sync_budget_secs: parse_or(&lookup, "SYNC_BUDGET_SECS", SYNC_BUDGET_SECS),
            sweep_concurrency: parse_or(&lookup, "SWEEP_CONCURRENCY", SWEEP_CONCURRENCY),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let backend = self.storage_backend.unwrap_or(StorageBackend::S3);
        match backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
                if self.s3_max_attempts == 0 {
                    return Err(anyhow::anyhow!("S3_MAX_ATTEMPTS must be at least 1"));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {}
        }

        let catalog = self.catalog_backend.unwrap_or(CatalogBackend::Postgres);
        if catalog == CatalogBackend::Postgres {
            match self.database_url.as_deref() {
                Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {}
                Some(_) => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ))
                }
                None => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be set when using the postgres catalog backend"
                    ))
                }
            }
        }

        if self.sync_max_concurrency == 0 || self.sync_max_concurrency > MAX_STORE_CONCURRENCY {
            return Err(anyhow::anyhow!(
                "SYNC_MAX_CONCURRENCY must be between 1 and {}",
                MAX_STORE_CONCURRENCY
            ));
        }

        if self.sweep_concurrency == 0 || self.sweep_concurrency > MAX_STORE_CONCURRENCY {
            return Err(anyhow::anyhow!(
                "SWEEP_CONCURRENCY must be between 1 and {}",
                MAX_STORE_CONCURRENCY
            ));
        }

        if self.sync_operation_timeout_secs == 0 || self.sync_budget_secs == 0 {
            return Err(anyhow::anyhow!(
                "SYNC_OPERATION_TIMEOUT_SECS and SYNC_BUDGET_SECS must be positive"
            ));
        }

        if self.storage_page_size == 0 {
            return Err(anyhow::anyhow!("STORAGE_PAGE_SIZE must be positive"));
        }

        if self.allowed_photo_content_types.is_empty() {
            return Err(anyhow::anyhow!(
                "ALLOWED_PHOTO_CONTENT_TYPES must list at least one content type"
            ));
        }

        Ok(())
    }
}
