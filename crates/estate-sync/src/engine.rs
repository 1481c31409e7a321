//! Property photo synchronization.
//!
//! One call to [`PhotoSyncEngine::synchronize`] reads the catalog, plans the
//! uploads and deletes, runs them concurrently with per-operation isolation,
//! folds the outcomes into the final photo list and writes that list back
//! exactly once. The catalog write always happens after every operation has
//! settled or the sync budget has run out.
//!
//! Callers must serialize calls per entity; the engine does not lock.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use estate_catalog::PhotoCatalog;
use estate_core::config::MAX_STORE_CONCURRENCY;
use estate_core::models::{PendingPhoto, SyncFailure, SyncOperation, SyncRequest, SyncResult};
use estate_core::validation::{build_photo_key, entity_key_prefix, validate_entity_id};
use estate_core::Config;
use estate_storage::Storage;
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::error::SyncError;

/// Failure reason for an operation that outlived its own timeout.
pub const REASON_TIMEOUT: &str = "timeout";
/// Failure reason for an operation still pending when the sync budget ran out.
pub const REASON_DEADLINE: &str = "deadline exceeded";
/// Failure reason for a delete of a key another entity owns.
pub const REASON_FOREIGN_KEY: &str = "key outside entity namespace";

const KEY_TOKEN_LENGTH: usize = 12;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Root of all photo keys, without slashes at either end.
    pub key_prefix: String,
    /// Concurrent object-store calls per sync, clamped to `1..=20`.
    pub max_concurrency: usize,
    pub operation_timeout: Duration,
    /// Wall-clock budget for the object-store phase of one sync.
    pub sync_budget: Duration,
    pub max_file_size: usize,
    /// Lower-cased media types accepted for upload. Empty accepts any
    /// non-text type.
    pub allowed_content_types: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            key_prefix: "properties".to_string(),
            max_concurrency: 8,
            operation_timeout: Duration::from_secs(30),
            sync_budget: Duration::from_secs(120),
            max_file_size: 15 * 1024 * 1024,
            allowed_content_types: [
                "image/jpeg",
                "image/png",
                "image/webp",
                "image/gif",
                "image/heic",
                "image/heif",
                "application/octet-stream",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        SyncSettings {
            key_prefix: config.photo_key_prefix().to_string(),
            max_concurrency: config.sync_max_concurrency(),
            operation_timeout: config.sync_operation_timeout(),
            sync_budget: config.sync_budget(),
            max_file_size: config.max_photo_size_bytes(),
            allowed_content_types: config.allowed_photo_content_types().to_vec(),
        }
    }
}

/// A single object-store call decided by the planner.
enum PlannedOp {
    Upload {
        key: String,
        file: PendingPhoto,
    },
    Delete {
        key: String,
    },
}

impl PlannedOp {
    fn operation(&self) -> SyncOperation {
        match self {
            PlannedOp::Upload { .. } => SyncOperation::Upload,
            PlannedOp::Delete { .. } => SyncOperation::Delete,
        }
    }

    fn key(&self) -> &str {
        match self {
            PlannedOp::Upload { key, .. } | PlannedOp::Delete { key } => key,
        }
    }

    /// Name used in failure records: uploads have no durable key yet.
    fn failure_key(&self) -> &str {
        match self {
            PlannedOp::Upload { file, .. } => &file.file_name,
            PlannedOp::Delete { key } => key,
        }
    }
}

/// Where each submitted file or delete ended up after planning. A refused
/// entry never reaches the object store; `key` is the file name for uploads.
enum Slot {
    Refused { key: String, reason: String },
    Planned(usize),
}

impl Slot {
    fn is_planned(&self) -> bool {
        matches!(self, Slot::Planned(_))
    }
}

struct Plan {
    kept: Vec<String>,
    files: Vec<Slot>,
    deletes: Vec<Slot>,
    ops: Vec<PlannedOp>,
}

pub struct PhotoSyncEngine {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn PhotoCatalog>,
    settings: SyncSettings,
}

impl PhotoSyncEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog: Arc<dyn PhotoCatalog>,
        mut settings: SyncSettings,
    ) -> Self {
        settings.max_concurrency = settings.max_concurrency.clamp(1, MAX_STORE_CONCURRENCY);
        settings.key_prefix = settings.key_prefix.trim_matches('/').to_string();
        settings.allowed_content_types = settings
            .allowed_content_types
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            storage,
            catalog,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn catalog(&self) -> &Arc<dyn PhotoCatalog> {
        &self.catalog
    }

    #[tracing::instrument(
        skip(self, request),
        fields(
            entity_id = %request.entity_id,
            keep = request.existing_photo_keys.len(),
            delete = request.deleted_photo_keys.len(),
            files = request.new_files.len()
        )
    )]
    pub async fn synchronize(&self, request: SyncRequest) -> Result<SyncResult, SyncError> {
        validate_entity_id(&request.entity_id)
            .map_err(|e| SyncError::InvalidRequest(e.to_string()))?;

        let start = Instant::now();
        let entity_id = request.entity_id.clone();

        let current = self
            .catalog
            .get_photo_keys(&entity_id)
            .await
            .map_err(|source| SyncError::CatalogRead {
                entity_id: entity_id.clone(),
                source,
            })?;

        let plan = self.plan(request, &current);
        let uploads = plan.files.iter().filter(|s| s.is_planned()).count();
        let deletes = plan.deletes.iter().filter(|s| s.is_planned()).count();
        tracing::debug!(
            kept = plan.kept.len(),
            uploads,
            deletes,
            rejected = plan.files.len() - uploads,
            refused_deletes = plan.deletes.len() - deletes,
            "Photo sync planned"
        );

        let outcomes = self.execute(&plan.ops).await;
        let result = Self::fold(&plan, &outcomes);

        for failure in &result.failures {
            tracing::warn!(
                operation = %failure.operation,
                key = %failure.key,
                reason = %failure.reason,
                "Photo sync operation failed"
            );
        }

        self.catalog
            .set_photo_keys(&entity_id, &result.final_photo_keys)
            .await
            .map_err(|source| {
                tracing::error!(
                    error = %source,
                    uploaded = result.uploaded,
                    deleted = result.deleted,
                    "Photo catalog write failed after object store changes"
                );
                SyncError::CatalogWrite {
                    entity_id: entity_id.clone(),
                    uploaded: result.uploaded,
                    deleted: result.deleted,
                    source,
                }
            })?;

        tracing::info!(
            uploaded = result.uploaded,
            deleted = result.deleted,
            failed = result.failures.len(),
            total = result.final_photo_keys.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Photo sync completed"
        );

        Ok(result)
    }

    /// Only keys under the entity's own prefix are ever deleted from the store.
    fn plan(&self, request: SyncRequest, current: &[String]) -> Plan {
        let current: HashSet<&str> = current.iter().map(String::as_str).collect();
        let namespace = entity_key_prefix(&self.settings.key_prefix, &request.entity_id);

        let mut seen = HashSet::new();
        let delete_keys: Vec<String> = request
            .deleted_photo_keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .collect();
        let deleting: HashSet<&str> = delete_keys.iter().map(String::as_str).collect();

        // Deletion wins over keep.
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for key in request.existing_photo_keys {
            let key = key.trim().to_string();
            if key.is_empty() || deleting.contains(key.as_str()) || !seen.insert(key.clone()) {
                continue;
            }
            if !current.contains(key.as_str()) {
                if !key.starts_with(&namespace) {
                    tracing::warn!(key = %key, "Kept photo key belongs to another entity; dropping");
                    continue;
                }
                tracing::warn!(key = %key, "Kept photo key is not in the catalog; keeping as given");
            }
            kept.push(key);
        }

        let mut ops = Vec::new();
        let mut files = Vec::with_capacity(request.new_files.len());
        for file in request.new_files {
            match self.check_candidate(&file) {
                Ok(()) => {
                    let key = self.upload_key(&request.entity_id, &file.file_name);
                    files.push(Slot::Planned(ops.len()));
                    ops.push(PlannedOp::Upload { key, file });
                }
                Err(reason) => files.push(Slot::Refused {
                    key: file.file_name,
                    reason,
                }),
            }
        }

        let mut deletes = Vec::new();
        for key in delete_keys {
            if !current.contains(key.as_str()) {
                tracing::debug!(key = %key, "Delete requested for key not in catalog; ignoring");
            } else if !key.starts_with(&namespace) {
                deletes.push(Slot::Refused {
                    key,
                    reason: REASON_FOREIGN_KEY.to_string(),
                });
            } else {
                deletes.push(Slot::Planned(ops.len()));
                ops.push(PlannedOp::Delete { key });
            }
        }

        Plan {
            kept,
            files,
            deletes,
            ops,
        }
    }

    /// Reject files that must never reach the object store.
    fn check_candidate(&self, file: &PendingPhoto) -> Result<(), String> {
        if file.payload.is_empty() {
            return Err("empty file".to_string());
        }

        let content_type = file
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        if content_type.starts_with("text/") {
            return Err(format!("content type {} is not a photo", content_type));
        }
        if !self.settings.allowed_content_types.is_empty()
            && !self.settings.allowed_content_types.contains(&content_type)
        {
            return Err(format!("unsupported content type {}", content_type));
        }
        if file.payload.len() > self.settings.max_file_size {
            return Err(format!(
                "file size {} exceeds maximum of {} bytes",
                file.payload.len(),
                self.settings.max_file_size
            ));
        }
        Ok(())
    }

    fn upload_key(&self, entity_id: &str, file_name: &str) -> String {
        let token: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(KEY_TOKEN_LENGTH)
            .collect();
        build_photo_key(
            &self.settings.key_prefix,
            entity_id,
            Utc::now(),
            &token,
            file_name,
        )
    }

    /// Run every operation with bounded concurrency. Returns one slot per
    /// op; `None` means it had not settled when the budget ran out.
    async fn execute(&self, ops: &[PlannedOp]) -> Vec<Option<Result<(), String>>> {
        let mut outcomes: Vec<Option<Result<(), String>>> = vec![None; ops.len()];
        if ops.is_empty() {
            return outcomes;
        }

        let deadline = tokio::time::Instant::now() + self.settings.sync_budget;
        let mut running = stream::iter(0..ops.len())
            .map(|index| {
                let op = &ops[index];
                async move { (index, self.run_op(op).await) }
            })
            .buffer_unordered(self.settings.max_concurrency);

        loop {
            match tokio::time::timeout_at(deadline, running.next()).await {
                Ok(Some((index, outcome))) => outcomes[index] = Some(outcome),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        budget_ms = self.settings.sync_budget.as_millis() as u64,
                        unsettled = outcomes.iter().filter(|o| o.is_none()).count(),
                        "Photo sync budget exhausted"
                    );
                    break;
                }
            }
        }

        outcomes
    }

    async fn run_op(&self, op: &PlannedOp) -> Result<(), String> {
        let start = Instant::now();
        let call = async {
            match op {
                PlannedOp::Upload { key, file } => self
                    .storage
                    .put(key, file.payload.clone(), &file.content_type)
                    .await
                    .map(|_| ()),
                PlannedOp::Delete { key } => self.storage.delete(key).await,
            }
        };

        let outcome = match tokio::time::timeout(self.settings.operation_timeout, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(REASON_TIMEOUT.to_string()),
        };

        tracing::debug!(
            operation = %op.operation(),
            key = %op.key(),
            ok = outcome.is_ok(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Photo sync operation settled"
        );

        outcome
    }

    /// Kept keys in their given order, then successful uploads in submission order.
    fn fold(plan: &Plan, outcomes: &[Option<Result<(), String>>]) -> SyncResult {
        let mut result = SyncResult {
            final_photo_keys: plan.kept.clone(),
            ..SyncResult::default()
        };

        for slot in &plan.files {
            match slot {
                Slot::Refused { key, reason } => {
                    result.failures.push(Self::refused(SyncOperation::Upload, key, reason))
                }
                Slot::Planned(index) => {
                    let op = &plan.ops[*index];
                    match Self::failure(op, &outcomes[*index]) {
                        None => {
                            result.uploaded += 1;
                            result.final_photo_keys.push(op.key().to_string());
                        }
                        Some(failure) => result.failures.push(failure),
                    }
                }
            }
        }

        for slot in &plan.deletes {
            match slot {
                Slot::Refused { key, reason } => {
                    result.failures.push(Self::refused(SyncOperation::Delete, key, reason))
                }
                Slot::Planned(index) => match Self::failure(&plan.ops[*index], &outcomes[*index]) {
                    None => result.deleted += 1,
                    Some(failure) => result.failures.push(failure),
                },
            }
        }

        result
    }

    fn refused(operation: SyncOperation, key: &str, reason: &str) -> SyncFailure {
        SyncFailure {
            operation,
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    fn failure(op: &PlannedOp, outcome: &Option<Result<(), String>>) -> Option<SyncFailure> {
        let reason = match outcome {
            Some(Ok(())) => return None,
            Some(Err(reason)) => reason.clone(),
            None => REASON_DEADLINE.to_string(),
        };
        Some(SyncFailure {
            operation: op.operation(),
            key: op.failure_key().to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FaultyStorage;
    use bytes::Bytes;
    use estate_catalog::MemoryPhotoCatalog;
    use estate_storage::MemoryStorage;
    use std::sync::atomic::Ordering;

    const ENTITY: &str = "prop-1";

    fn photo(name: &str) -> PendingPhoto {
        PendingPhoto {
            file_name: name.to_string(),
            content_type: "image/jpeg".to_string(),
            payload: Bytes::from_static(b"\xff\xd8\xff\xe0jpeg-bytes"),
        }
    }

    fn request(existing: &[&str], deleted: &[&str], files: Vec<PendingPhoto>) -> SyncRequest {
        SyncRequest {
            entity_id: ENTITY.to_string(),
            existing_photo_keys: existing.iter().map(|k| k.to_string()).collect(),
            deleted_photo_keys: deleted.iter().map(|k| k.to_string()).collect(),
            new_files: files,
        }
    }

    async fn engine_with(
        storage: FaultyStorage,
        catalog_keys: &[&str],
        settings: SyncSettings,
    ) -> (PhotoSyncEngine, Arc<FaultyStorage>, MemoryPhotoCatalog) {
        for key in catalog_keys {
            storage
                .inner
                .put(key, Bytes::from_static(b"old"), "image/jpeg")
                .await
                .unwrap();
        }
        let storage = Arc::new(storage);
        let catalog = MemoryPhotoCatalog::new()
            .with_entity(ENTITY, catalog_keys)
            .await;
        let engine = PhotoSyncEngine::new(storage.clone(), Arc::new(catalog.clone()), settings);
        (engine, storage, catalog)
    }

    async fn engine(
        storage: FaultyStorage,
        catalog_keys: &[&str],
    ) -> (PhotoSyncEngine, Arc<FaultyStorage>, MemoryPhotoCatalog) {
        engine_with(storage, catalog_keys, SyncSettings::default()).await
    }

    fn faulty() -> FaultyStorage {
        FaultyStorage::new(MemoryStorage::new())
    }

    #[tokio::test]
    async fn test_keep_and_upload_all_succeed() {
        let (engine, storage, catalog) = engine(faulty(), &["p1"]).await;

        let result = engine
            .synchronize(request(&["p1"], &[], vec![photo("a.jpg")]))
            .await
            .unwrap();

        assert_eq!(result.final_photo_keys.len(), 2);
        assert_eq!(result.final_photo_keys[0], "p1");
        let new_key = &result.final_photo_keys[1];
        assert!(new_key.starts_with("properties/prop-1/"));
        assert!(new_key.ends_with("-a.jpg"));
        assert_eq!(result.uploaded, 1);
        assert_eq!(result.deleted, 0);
        assert!(result.failures.is_empty());

        assert!(storage.inner.contains(new_key).await);
        assert_eq!(catalog.snapshot(ENTITY).await, Some(result.final_photo_keys.clone()));
    }

    #[tokio::test]
    async fn test_permanent_upload_failure_still_writes_catalog() {
        let (engine, _storage, catalog) =
            engine(faulty().fail_puts_containing("a.jpg"), &["p1"]).await;

        let result = engine
            .synchronize(request(&["p1"], &[], vec![photo("a.jpg")]))
            .await
            .unwrap();

        assert_eq!(result.final_photo_keys, vec!["p1"]);
        assert_eq!(result.uploaded, 0);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].operation, SyncOperation::Upload);
        assert_eq!(result.failures[0].key, "a.jpg");
        assert!(result.failures[0].reason.contains("AccessDenied"));

        assert_eq!(catalog.write_count(), 1);
        assert_eq!(catalog.snapshot(ENTITY).await, Some(vec!["p1".to_string()]));
    }

    const KEY_A: &str = "properties/prop-1/1700000000000-aaaaaaaaaaaa-a.jpg";
    const KEY_B: &str = "properties/prop-1/1700000000000-bbbbbbbbbbbb-b.jpg";

    #[tokio::test]
    async fn test_deletion_wins_over_keep() {
        let (engine, storage, _catalog) = engine(faulty(), &[KEY_A, KEY_B]).await;

        let result = engine
            .synchronize(request(&[KEY_A, KEY_B], &[KEY_B], vec![]))
            .await
            .unwrap();

        assert_eq!(result.final_photo_keys, vec![KEY_A]);
        assert_eq!(result.deleted, 1);
        assert!(!storage.inner.contains(KEY_B).await);
        assert!(storage.inner.contains(KEY_A).await);
    }

    #[tokio::test]
    async fn test_one_failed_upload_does_not_affect_siblings() {
        let (engine, storage, catalog) =
            engine(faulty().fail_puts_containing("second"), &[]).await;

        let result = engine
            .synchronize(request(
                &[],
                &[],
                vec![photo("first.jpg"), photo("second.jpg"), photo("third.jpg")],
            ))
            .await
            .unwrap();

        assert_eq!(result.uploaded, 2);
        assert_eq!(result.final_photo_keys.len(), 2);
        assert!(result.final_photo_keys[0].ends_with("-first.jpg"));
        assert!(result.final_photo_keys[1].ends_with("-third.jpg"));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].key, "second.jpg");
        assert_eq!(storage.put_calls.load(Ordering::SeqCst), 3);
        assert_eq!(catalog.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_is_still_dropped_from_catalog() {
        let (engine, storage, catalog) =
            engine(faulty().fail_deletes_containing("-b.jpg"), &[KEY_A, KEY_B]).await;

        let result = engine
            .synchronize(request(&[KEY_A], &[KEY_B], vec![]))
            .await
            .unwrap();

        assert_eq!(result.final_photo_keys, vec![KEY_A]);
        assert_eq!(result.deleted, 0);
        assert_eq!(
            result.failures,
            vec![SyncFailure {
                operation: SyncOperation::Delete,
                key: KEY_B.to_string(),
                reason: "Delete failed: AccessDenied".to_string(),
            }]
        );
        assert!(storage.inner.contains(KEY_B).await);
        assert_eq!(catalog.snapshot(ENTITY).await, Some(vec![KEY_A.to_string()]));
    }

    #[tokio::test]
    async fn test_delete_of_unknown_key_is_ignored() {
        let (engine, storage, _catalog) = engine(faulty(), &["A"]).await;

        let result = engine
            .synchronize(request(&["A"], &["not-ours", "not-ours"], vec![]))
            .await
            .unwrap();

        assert_eq!(result.final_photo_keys, vec!["A"]);
        assert_eq!(result.deleted, 0);
        assert!(result.failures.is_empty());
        assert_eq!(storage.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_candidates_never_reach_the_store() {
        let settings = SyncSettings {
            max_file_size: 16,
            ..SyncSettings::default()
        };
        let (engine, storage, _catalog) = engine_with(faulty(), &[], settings).await;

        let mut empty = photo("empty.jpg");
        empty.payload = Bytes::new();
        let mut text = photo("notes.txt");
        text.content_type = "text/plain".to_string();
        let mut pdf = photo("doc.pdf");
        pdf.content_type = "application/pdf".to_string();
        let mut big = photo("big.jpg");
        big.payload = Bytes::from(vec![0u8; 17]);
        let mut png = photo("ok.png");
        png.content_type = "image/PNG; charset=binary".to_string();

        let result = engine
            .synchronize(request(&[], &[], vec![empty, text, pdf, big, png]))
            .await
            .unwrap();

        let rejected: Vec<&str> = result.failures.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(rejected, vec!["empty.jpg", "notes.txt", "doc.pdf", "big.jpg"]);
        assert!(result
            .failures
            .iter()
            .all(|f| f.operation == SyncOperation::Upload));
        assert_eq!(result.uploaded, 1);
        assert_eq!(storage.put_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_operation_times_out_alone() {
        let settings = SyncSettings {
            operation_timeout: Duration::from_millis(50),
            ..SyncSettings::default()
        };
        let storage = faulty().stall_containing("slow", Duration::from_millis(500));
        let (engine, _storage, catalog) = engine_with(storage, &[], settings).await;

        let result = engine
            .synchronize(request(&[], &[], vec![photo("slow.jpg"), photo("fast.jpg")]))
            .await
            .unwrap();

        assert_eq!(result.uploaded, 1);
        assert!(result.final_photo_keys[0].ends_with("-fast.jpg"));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].key, "slow.jpg");
        assert_eq!(result.failures[0].reason, REASON_TIMEOUT);
        assert_eq!(catalog.write_count(), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_records_pending_operations() {
        let settings = SyncSettings {
            operation_timeout: Duration::from_secs(10),
            sync_budget: Duration::from_millis(100),
            ..SyncSettings::default()
        };
        let storage = faulty().stall_containing("stuck", Duration::from_secs(5));
        let (engine, _storage, catalog) = engine_with(storage, &["p1"], settings).await;

        let result = engine
            .synchronize(request(&["p1"], &[], vec![photo("stuck.jpg"), photo("ok.jpg")]))
            .await
            .unwrap();

        assert_eq!(result.final_photo_keys.len(), 2);
        assert_eq!(result.final_photo_keys[0], "p1");
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].key, "stuck.jpg");
        assert_eq!(result.failures[0].reason, REASON_DEADLINE);
        assert_eq!(
            catalog.snapshot(ENTITY).await,
            Some(result.final_photo_keys.clone())
        );
    }

    #[tokio::test]
    async fn test_catalog_write_failure_is_surfaced() {
        let (engine, storage, catalog) = engine(faulty(), &["p1"]).await;
        catalog.fail_writes(true);

        let err = engine
            .synchronize(request(&["p1"], &[], vec![photo("a.jpg")]))
            .await
            .unwrap_err();

        match err {
            SyncError::CatalogWrite {
                uploaded, deleted, ..
            } => {
                assert_eq!(uploaded, 1);
                assert_eq!(deleted, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The upload went through; only the catalog is stale.
        assert_eq!(storage.inner.len().await, 2);
        assert_eq!(catalog.snapshot(ENTITY).await, Some(vec!["p1".to_string()]));
    }

    #[tokio::test]
    async fn test_catalog_read_failure_applies_nothing() {
        let (engine, storage, catalog) = engine(faulty(), &["p1"]).await;
        catalog.fail_reads(true);

        let err = engine
            .synchronize(request(&[], &["p1"], vec![photo("a.jpg")]))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::CatalogRead { .. }));
        assert_eq!(storage.put_calls.load(Ordering::SeqCst), 0);
        assert_eq!(storage.delete_calls.load(Ordering::SeqCst), 0);
        assert_eq!(catalog.write_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let settings = SyncSettings {
            max_concurrency: 3,
            ..SyncSettings::default()
        };
        let storage = faulty().with_call_delay(Duration::from_millis(20));
        let (engine, storage, _catalog) = engine_with(storage, &[], settings).await;

        let files = (0..10).map(|i| photo(&format!("{i}.jpg"))).collect();
        let result = engine.synchronize(request(&[], &[], files)).await.unwrap();

        assert_eq!(result.uploaded, 10);
        let peak = storage.peak_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {peak}");
        assert!(peak >= 2, "operations did not overlap");
    }

    #[tokio::test]
    async fn test_upload_order_follows_submission_not_completion() {
        // The first file settles last.
        let storage = faulty().stall_containing("first", Duration::from_millis(100));
        let (engine, _storage, _catalog) = engine(storage, &[]).await;

        let result = engine
            .synchronize(request(
                &[],
                &[],
                vec![photo("first.jpg"), photo("second.jpg"), photo("third.jpg")],
            ))
            .await
            .unwrap();

        let suffixes: Vec<&str> = result
            .final_photo_keys
            .iter()
            .map(|k| k.rsplit('-').next().unwrap())
            .collect();
        assert_eq!(suffixes, vec!["first.jpg", "second.jpg", "third.jpg"]);
    }

    #[tokio::test]
    async fn test_duplicate_keep_keys_collapse() {
        let (engine, _storage, _catalog) = engine(faulty(), &["A", "B"]).await;
        let result = engine
            .synchronize(request(&["B", "A", "B", " A "], &[], vec![]))
            .await
            .unwrap();
        assert_eq!(result.final_photo_keys, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_invalid_entity_is_rejected_before_any_io() {
        let (engine, _storage, catalog) = engine(faulty(), &[]).await;
        let mut req = request(&[], &[], vec![]);
        req.entity_id = "../etc".to_string();

        let err = engine.synchronize(req).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
        assert_eq!(catalog.write_count(), 0);
    }

    const VICTIM_KEY: &str = "properties/victim/1700000000000-cccccccccccc-front.jpg";

    #[tokio::test]
    async fn test_other_entity_photo_cannot_be_adopted_then_deleted() {
        let storage = faulty();
        storage
            .inner
            .put(VICTIM_KEY, Bytes::from_static(b"victim"), "image/jpeg")
            .await
            .unwrap();
        let storage = Arc::new(storage);
        let catalog = MemoryPhotoCatalog::new()
            .with_entity("victim", &[VICTIM_KEY])
            .await;
        let engine = PhotoSyncEngine::new(
            storage.clone(),
            Arc::new(catalog.clone()),
            SyncSettings::default(),
        );

        let first = engine
            .synchronize(request(&[VICTIM_KEY], &[], vec![]))
            .await
            .unwrap();
        assert!(first.final_photo_keys.is_empty());

        let second = engine
            .synchronize(request(&[], &[VICTIM_KEY], vec![]))
            .await
            .unwrap();
        assert_eq!(second.deleted, 0);

        assert_eq!(storage.delete_calls.load(Ordering::SeqCst), 0);
        assert!(storage.inner.contains(VICTIM_KEY).await);
        assert_eq!(
            catalog.snapshot("victim").await,
            Some(vec![VICTIM_KEY.to_string()])
        );
    }

    #[tokio::test]
    async fn test_foreign_key_in_catalog_is_dropped_without_store_delete() {
        let (engine, storage, catalog) = engine(faulty(), &[KEY_A, VICTIM_KEY]).await;

        let result = engine
            .synchronize(request(&[KEY_A, VICTIM_KEY], &[VICTIM_KEY], vec![]))
            .await
            .unwrap();

        assert_eq!(result.final_photo_keys, vec![KEY_A]);
        assert_eq!(result.deleted, 0);
        assert_eq!(
            result.failures,
            vec![SyncFailure {
                operation: SyncOperation::Delete,
                key: VICTIM_KEY.to_string(),
                reason: REASON_FOREIGN_KEY.to_string(),
            }]
        );
        assert_eq!(storage.delete_calls.load(Ordering::SeqCst), 0);
        assert!(storage.inner.contains(VICTIM_KEY).await);
        assert_eq!(catalog.snapshot(ENTITY).await, Some(vec![KEY_A.to_string()]));
    }

    #[tokio::test]
    async fn test_foreign_key_already_listed_can_still_be_kept() {
        let (engine, _storage, _catalog) = engine(faulty(), &[VICTIM_KEY]).await;

        let result = engine
            .synchronize(request(&[VICTIM_KEY], &[], vec![]))
            .await
            .unwrap();

        assert_eq!(result.final_photo_keys, vec![VICTIM_KEY]);
    }

    #[tokio::test]
    async fn test_generic_binary_upload_is_accepted_by_default() {
        let (engine, _storage, _catalog) = engine(faulty(), &[]).await;
        let mut raw = photo("scan.bin");
        raw.content_type = "application/octet-stream".to_string();

        let result = engine
            .synchronize(request(&[], &[], vec![raw]))
            .await
            .unwrap();

        assert_eq!(result.uploaded, 1);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_fold_is_deterministic_for_equal_outcomes() {
        let plan = || Plan {
            kept: vec!["k1".to_string(), "k2".to_string()],
            files: vec![
                Slot::Planned(0),
                Slot::Refused {
                    key: "bad.txt".to_string(),
                    reason: "content type text/plain is not a photo".to_string(),
                },
                Slot::Planned(1),
            ],
            deletes: vec![Slot::Planned(2)],
            ops: vec![
                PlannedOp::Upload {
                    key: "u1".to_string(),
                    file: photo("one.jpg"),
                },
                PlannedOp::Upload {
                    key: "u2".to_string(),
                    file: photo("two.jpg"),
                },
                PlannedOp::Delete {
                    key: "d1".to_string(),
                },
            ],
        };
        let outcomes = vec![Some(Ok(())), Some(Ok(())), None];

        let first = PhotoSyncEngine::fold(&plan(), &outcomes);
        let second = PhotoSyncEngine::fold(&plan(), &outcomes);

        assert_eq!(first, second);
        assert_eq!(first.final_photo_keys, vec!["k1", "k2", "u1", "u2"]);
        assert_eq!(first.uploaded, 2);
        assert_eq!(first.deleted, 0);
        assert_eq!(first.failures.len(), 2);
        assert_eq!(first.failures[0].key, "bad.txt");
        assert_eq!(first.failures[1].key, "d1");
        assert_eq!(first.failures[1].reason, REASON_DEADLINE);
    }
}
