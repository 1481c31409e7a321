//! Application state shared by every handler.

use crate::locks::EntityLocks;
use estate_catalog::PhotoCatalog;
use estate_core::Config;
use estate_storage::Storage;
use estate_sync::{PhotoSyncEngine, SyncSettings};
use std::sync::Arc;

pub struct AppState {
    /// Owns the storage and catalog handles used by every route.
    pub engine: PhotoSyncEngine,
    pub locks: EntityLocks,
}

impl AppState {
    pub fn new(config: &Config, storage: Arc<dyn Storage>, catalog: Arc<dyn PhotoCatalog>) -> Self {
        Self {
            engine: PhotoSyncEngine::new(storage, catalog, SyncSettings::from_config(config)),
            locks: EntityLocks::new(),
        }
    }

    pub fn storage(&self) -> &dyn Storage {
        self.engine.storage().as_ref()
    }

    pub fn catalog(&self) -> &dyn PhotoCatalog {
        self.engine.catalog().as_ref()
    }
}
