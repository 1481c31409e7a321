//! Fault-injecting storage wrapper for engine and sweep tests.

use async_trait::async_trait;
use bytes::Bytes;
use estate_storage::{
    CopyOptions, ListPage, MemoryStorage, ObjectAcl, Storage, StorageBackend, StorageError,
    StorageResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Wraps `MemoryStorage`; calls whose key contains a registered pattern
/// fail or stall. Also records call counts and peak concurrency.
pub struct FaultyStorage {
    pub inner: MemoryStorage,
    failing_puts: Mutex<Vec<String>>,
    failing_deletes: Mutex<Vec<String>>,
    failing_keys: Mutex<Vec<String>>,
    stalled: Mutex<Vec<(String, Duration)>>,
    fail_list_after_pages: Mutex<Option<usize>>,
    list_calls: AtomicUsize,
    pub put_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    call_delay: Mutex<Duration>,
}

impl FaultyStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        FaultyStorage {
            inner,
            failing_puts: Mutex::new(Vec::new()),
            failing_deletes: Mutex::new(Vec::new()),
            failing_keys: Mutex::new(Vec::new()),
            stalled: Mutex::new(Vec::new()),
            fail_list_after_pages: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            call_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn fail_puts_containing(self, pattern: &str) -> Self {
        self.failing_puts.lock().unwrap().push(pattern.to_string());
        self
    }

    pub fn fail_deletes_containing(self, pattern: &str) -> Self {
        self.failing_deletes.lock().unwrap().push(pattern.to_string());
        self
    }

    /// Fail copy and set_acl on matching keys.
    pub fn fail_key(self, pattern: &str) -> Self {
        self.failing_keys.lock().unwrap().push(pattern.to_string());
        self
    }

    pub fn stall_containing(self, pattern: &str, delay: Duration) -> Self {
        self.stalled
            .lock()
            .unwrap()
            .push((pattern.to_string(), delay));
        self
    }

    pub fn fail_list_after(self, pages: usize) -> Self {
        *self.fail_list_after_pages.lock().unwrap() = Some(pages);
        self
    }

    /// Delay every mutating call, to make overlap observable.
    pub fn with_call_delay(self, delay: Duration) -> Self {
        *self.call_delay.lock().unwrap() = delay;
        self
    }

    fn matches(patterns: &Mutex<Vec<String>>, key: &str) -> bool {
        patterns.lock().unwrap().iter().any(|p| key.contains(p.as_str()))
    }

    async fn enter(&self, key: &str) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let stall = self
            .stalled
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| key.contains(p.as_str()))
            .map(|(_, d)| *d);
        let delay = stall.unwrap_or(*self.call_delay.lock().unwrap());
        let guard = InFlight(&self.in_flight);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        guard
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn list(&self, prefix: &str, page_token: Option<&str>) -> StorageResult<ListPage> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_list_after_pages.lock().unwrap() {
            if call >= limit {
                return Err(StorageError::Unavailable("injected list failure".to_string()));
            }
        }
        self.inner.list(prefix, page_token).await
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter(key).await;
        if Self::matches(&self.failing_puts, key) {
            return Err(StorageError::UploadFailed("AccessDenied".to_string()));
        }
        self.inner.put(key, data, content_type).await
    }

    async fn copy(
        &self,
        source_key: &str,
        dest_key: &str,
        options: CopyOptions,
    ) -> StorageResult<()> {
        let _guard = self.enter(source_key).await;
        if Self::matches(&self.failing_keys, source_key) {
            return Err(StorageError::CopyFailed("AccessDenied".to_string()));
        }
        self.inner.copy(source_key, dest_key, options).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter(key).await;
        if Self::matches(&self.failing_deletes, key) {
            return Err(StorageError::DeleteFailed("AccessDenied".to_string()));
        }
        self.inner.delete(key).await
    }

    async fn set_acl(&self, key: &str, acl: ObjectAcl) -> StorageResult<()> {
        let _guard = self.enter(key).await;
        if Self::matches(&self.failing_keys, key) {
            return Err(StorageError::AclFailed("AccessDenied".to_string()));
        }
        self.inner.set_acl(key, acl).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
