use estate_catalog::CatalogError;
use estate_core::AppError;
use thiserror::Error;

/// Failures that abort a synchronization as a whole. Per-object store
/// failures are never reported here; they end up in `SyncResult::failures`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid sync request: {0}")]
    InvalidRequest(String),

    /// Nothing was applied.
    #[error("Failed to read photo catalog for {entity_id}: {source}")]
    CatalogRead {
        entity_id: String,
        #[source]
        source: CatalogError,
    },

    /// Object store changes were applied but the photo list was not saved.
    #[error("Failed to write photo catalog for {entity_id} after {uploaded} uploads and {deleted} deletes: {source}")]
    CatalogWrite {
        entity_id: String,
        uploaded: usize,
        deleted: usize,
        #[source]
        source: CatalogError,
    },
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::InvalidRequest(message) => AppError::InvalidInput(message),
            SyncError::CatalogRead { source, .. } => AppError::Catalog(source.to_string()),
            SyncError::CatalogWrite {
                entity_id,
                uploaded,
                deleted,
                source,
            } => AppError::SyncNotPersisted {
                entity_id,
                uploaded,
                deleted,
                message: source.to_string(),
            },
        }
    }
}
