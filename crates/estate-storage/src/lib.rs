//! Estate Storage Library
//!
//! Object store abstraction used by the photo sync engine and the maintenance
//! sweeps: paginated listing, put, copy, delete and canned ACLs. Backends are
//! S3 (and S3-compatible providers), the local filesystem and an in-memory
//! map for development and tests.
//!
//! # Storage key format
//!
//! Keys are `/`-separated object paths. They must not be empty, start with
//! `/`, or contain a `..` segment. Validation is centralized in the `keys`
//! module so every backend rejects the same keys.

pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use estate_core::StorageBackend;
pub use factory::create_storage;
pub use keys::MAX_PAGE_SIZE;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{CopyOptions, ListPage, ObjectAcl, Storage, StorageError, StorageResult};
