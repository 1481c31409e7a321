//! Estate Core Library
//!
//! This crate provides the domain models, multipart parser, error types,
//! configuration and validation shared by every estate component.

pub mod config;
pub mod error;
pub mod models;
pub mod multipart;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{BaseConfig, Config, PhotoServiceConfig, MAX_STORE_CONCURRENCY};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use multipart::RawPart;
pub use storage_types::{CatalogBackend, StorageBackend};
// Note: Storage, StorageError and PhotoCatalog live in estate-storage and estate-catalog.
