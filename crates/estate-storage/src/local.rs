use crate::keys::{clamp_page_size, validate_key, MAX_PAGE_SIZE};
use crate::traits::{CopyOptions, ListPage, ObjectAcl, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Directory under the base path holding one marker file per public object.
const ACL_DIR: &str = ".acl";

/// Local filesystem storage implementation
///
/// Objects are plain files under `base_path`. A public-read ACL is a marker
/// file at `base_path/.acl/{key}`; its absence means private.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
    page_size: usize,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/estate/photos")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:4000/photos")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
            page_size: MAX_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = clamp_page_size(page_size);
        self
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// This function validates that the storage key doesn't contain path traversal
    /// sequences that could escape the base storage directory.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;
        if storage_key == ACL_DIR || storage_key.starts_with(&format!("{}/", ACL_DIR)) {
            return Err(StorageError::InvalidKey(format!(
                "Storage key must not start with {}",
                ACL_DIR
            )));
        }

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    fn acl_marker_path(&self, storage_key: &str) -> PathBuf {
        self.base_path.join(ACL_DIR).join(storage_key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn write_acl(&self, storage_key: &str, acl: ObjectAcl) -> StorageResult<()> {
        let marker = self.acl_marker_path(storage_key);
        match acl {
            ObjectAcl::PublicRead => {
                self.ensure_parent_dir(&marker).await?;
                fs::write(&marker, acl.to_string()).await?;
            }
            ObjectAcl::Private => {
                if fs::try_exists(&marker).await.unwrap_or(false) {
                    fs::remove_file(&marker).await?;
                }
            }
        }
        Ok(())
    }

    /// Current ACL of an object, read from its marker file.
    pub async fn acl(&self, storage_key: &str) -> StorageResult<ObjectAcl> {
        self.key_to_path(storage_key)?;
        if fs::try_exists(self.acl_marker_path(storage_key))
            .await
            .unwrap_or(false)
        {
            Ok(ObjectAcl::PublicRead)
        } else {
            Ok(ObjectAcl::Private)
        }
    }

    /// Collect every key below `dir` that starts with `prefix`.
    async fn collect_keys(&self, dir: PathBuf, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![dir];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StorageError::ListFailed(format!(
                        "Failed to read directory {}: {}",
                        dir.display(),
                        e
                    )))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                let Ok(relative) = path.strip_prefix(&self.base_path) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if file_type.is_dir() {
                    if key != ACL_DIR {
                        pending.push(path);
                    }
                } else if file_type.is_file() && key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list(&self, prefix: &str, page_token: Option<&str>) -> StorageResult<ListPage> {
        let start = std::time::Instant::now();

        // Only walk the deepest directory the prefix pins down.
        let dir = match prefix.rfind('/') {
            Some(idx) => {
                let dir_prefix = &prefix[..idx];
                if dir_prefix.is_empty() {
                    self.base_path.clone()
                } else {
                    self.key_to_path(dir_prefix)?
                }
            }
            None => self.base_path.clone(),
        };

        let all = self.collect_keys(dir, prefix).await?;
        let mut remaining = all
            .into_iter()
            .filter(|key| page_token.map_or(true, |token| key.as_str() > token));

        let keys: Vec<String> = remaining.by_ref().take(self.page_size).collect();
        let next_page_token = if remaining.next().is_some() {
            keys.last().cloned()
        } else {
            None
        };

        tracing::info!(
            prefix = %prefix,
            count = keys.len(),
            has_more = next_page_token.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage list successful"
        );

        Ok(ListPage {
            keys,
            next_page_token,
        })
    }

    async fn put(&self, storage_key: &str, data: Bytes, _content_type: &str) -> StorageResult<String> {
        let path = self.key_to_path(storage_key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        // A fresh object starts private.
        self.write_acl(storage_key, ObjectAcl::Private).await?;

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(storage_key.to_string())
    }

    async fn copy(
        &self,
        source_key: &str,
        dest_key: &str,
        options: CopyOptions,
    ) -> StorageResult<()> {
        let from_path = self.key_to_path(source_key)?;
        let to_path = self.key_to_path(dest_key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&from_path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(source_key.to_string()));
        }

        if from_path != to_path {
            self.ensure_parent_dir(&to_path).await?;
            fs::copy(&from_path, &to_path).await.map_err(|e| {
                StorageError::CopyFailed(format!(
                    "Failed to copy {} to {}: {}",
                    from_path.display(),
                    to_path.display(),
                    e
                ))
            })?;
        }

        self.write_acl(dest_key, options.acl.unwrap_or_default())
            .await?;

        tracing::info!(
            from_key = %source_key,
            to_key = %dest_key,
            acl = ?options.acl,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage copy successful"
        );

        Ok(())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;
        self.write_acl(storage_key, ObjectAcl::Private).await?;

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn set_acl(&self, storage_key: &str, acl: ObjectAcl) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(storage_key.to_string()));
        }

        self.write_acl(storage_key, acl).await.map_err(|e| {
            StorageError::AclFailed(format!("Failed to set ACL on {}: {}", storage_key, e))
        })?;

        tracing::info!(key = %storage_key, acl = %acl, "Local storage set_acl successful");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
