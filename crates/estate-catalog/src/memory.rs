//! In-memory catalog for development and tests.

use crate::traits::{CatalogError, CatalogResult, PhotoCatalog};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    entries: RwLock<HashMap<String, Vec<String>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

/// Catalog kept in a process-local map. Clones share state.
///
/// Reads and writes can be switched to fail, which is how callers exercise
/// their catalog error paths.
#[derive(Clone, Default)]
pub struct MemoryPhotoCatalog {
    inner: Arc<Inner>,
}

impl MemoryPhotoCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_entity(self, entity_id: &str, keys: &[&str]) -> Self {
        self.inner.entries.write().await.insert(
            entity_id.to_string(),
            keys.iter().map(|k| k.to_string()).collect(),
        );
        self
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of write attempts, failed ones included.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self, entity_id: &str) -> Option<Vec<String>> {
        self.inner.entries.read().await.get(entity_id).cloned()
    }
}

#[async_trait]
impl PhotoCatalog for MemoryPhotoCatalog {
    async fn get_photo_keys(&self, entity_id: &str) -> CatalogResult<Vec<String>> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable(
                "injected catalog read failure".to_string(),
            ));
        }
        Ok(self
            .inner
            .entries
            .read()
            .await
            .get(entity_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_photo_keys(&self, entity_id: &str, keys: &[String]) -> CatalogResult<()> {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable(
                "injected catalog write failure".to_string(),
            ));
        }
        self.inner
            .entries
            .write()
            .await
            .insert(entity_id.to_string(), keys.to_vec());
        tracing::debug!(entity_id = %entity_id, count = keys.len(), "Memory catalog updated");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
