//! In-memory object store.
//!
//! Keys are kept in a `BTreeMap`, so listing is ordered and a page token is
//! simply the last key of the previous page.

use crate::keys::{clamp_page_size, validate_key, MAX_PAGE_SIZE};
use crate::traits::{CopyOptions, ListPage, ObjectAcl, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A stored object with the metadata the trait can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub acl: ObjectAcl,
}

/// Process-local storage backend. Clones share the same objects.
#[derive(Clone)]
pub struct MemoryStorage {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    base_url: String,
    page_size: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            base_url: "memory://objects".to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = clamp_page_size(page_size);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list(&self, prefix: &str, page_token: Option<&str>) -> StorageResult<ListPage> {
        let objects = self.objects.read().await;

        let lower = match page_token {
            Some(token) if token >= prefix => Bound::Excluded(token),
            _ => Bound::Included(prefix),
        };

        let mut matching = objects
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let next_page_token = if matching.next().is_some() {
            keys.last().cloned()
        } else {
            None
        };

        tracing::debug!(
            prefix = %prefix,
            count = keys.len(),
            has_more = next_page_token.is_some(),
            "Memory storage list"
        );

        Ok(ListPage {
            keys,
            next_page_token,
        })
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        let size = data.len();

        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                acl: ObjectAcl::Private,
            },
        );

        tracing::debug!(key = %key, size_bytes = size, "Memory storage put");
        Ok(key.to_string())
    }

    async fn copy(
        &self,
        source_key: &str,
        dest_key: &str,
        options: CopyOptions,
    ) -> StorageResult<()> {
        validate_key(source_key)?;
        validate_key(dest_key)?;

        let mut objects = self.objects.write().await;
        let source = objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(source_key.to_string()))?;

        objects.insert(
            dest_key.to_string(),
            StoredObject {
                acl: options.acl.unwrap_or_default(),
                ..source
            },
        );

        tracing::debug!(from_key = %source_key, to_key = %dest_key, "Memory storage copy");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.objects.write().await.remove(key);
        tracing::debug!(key = %key, "Memory storage delete");
        Ok(())
    }

    async fn set_acl(&self, key: &str, acl: ObjectAcl) -> StorageResult<()> {
        validate_key(key)?;
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        object.acl = acl;
        tracing::debug!(key = %key, acl = %acl, "Memory storage set_acl");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
