//! Storage abstraction trait
//!
//! This module defines the Storage trait that all object store backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("Setting ACL failed: {0}")]
    AclFailed(String),

    #[error("Listing failed: {0}")]
    ListFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Throttling, 5xx responses, timeouts and connection failures.
    #[error("Storage temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether a later attempt of the same call may succeed.
    ///
    /// Nothing in this crate retries on this basis beyond the S3 SDK's own
    /// retry policy; callers apply their own.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) => true,
            StorageError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Canned access control applied to a single object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectAcl {
    #[default]
    Private,
    PublicRead,
}

impl fmt::Display for ObjectAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectAcl::Private => write!(f, "private"),
            ObjectAcl::PublicRead => write!(f, "public-read"),
        }
    }
}

/// Options for [`Storage::copy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// ACL of the destination object; `None` leaves the backend default (private).
    pub acl: Option<ObjectAcl>,
    /// Rewrite the destination's metadata instead of copying it. Required by
    /// S3 when source and destination are the same key.
    pub replace_metadata: bool,
}

impl CopyOptions {
    pub fn public_in_place() -> Self {
        CopyOptions {
            acl: Some(ObjectAcl::PublicRead),
            replace_metadata: true,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Present when more keys remain; pass it back to continue.
    pub next_page_token: Option<String>,
}

/// Storage abstraction trait
///
/// The sync engine and the maintenance sweeps only talk to the object store
/// through this trait. Every call either succeeds or fails independently;
/// there are no multi-object transactions.
#[async_trait]
pub trait Storage: Send + Sync {
    /// List keys under `prefix`, at most one backend page per call.
    async fn list(&self, prefix: &str, page_token: Option<&str>) -> StorageResult<ListPage>;

    /// Store `data` under `key`, replacing any existing object. Returns the key.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String>;

    /// Copy an object. `source_key` and `dest_key` may be equal.
    async fn copy(&self, source_key: &str, dest_key: &str, options: CopyOptions)
        -> StorageResult<()>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Apply a canned ACL to an existing object.
    async fn set_acl(&self, key: &str, acl: ObjectAcl) -> StorageResult<()>;

    /// URL under which the object is served when public.
    fn public_url(&self, key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
