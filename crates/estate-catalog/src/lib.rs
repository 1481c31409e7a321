//! Estate Catalog Library
//!
//! The catalog is the source of truth for which photo keys belong to a
//! property and in which order. It is read once before a sync and written
//! once after all object-store operations have settled.

pub mod factory;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use factory::create_catalog;
pub use memory::MemoryPhotoCatalog;
pub use postgres::PgPhotoCatalog;
pub use traits::{CatalogError, CatalogResult, PhotoCatalog};
