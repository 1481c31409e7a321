//! Bulk maintenance over every object under a prefix.
//!
//! A sweep lists one page, applies a single-object operation to each key of
//! the page with bounded concurrency, and follows the continuation token
//! until the store reports no more pages. Per-key failures are tallied and
//! never stop the sweep. A failed listing ends it, since the remaining keys
//! are unknown.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use estate_core::config::MAX_STORE_CONCURRENCY;
use estate_core::models::SweepReport;
use estate_core::Config;
use estate_storage::{CopyOptions, ObjectAcl, Storage, StorageResult};
use futures::stream::{self, StreamExt};

#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// Concurrent object calls per page, clamped to `1..=20`.
    pub concurrency: usize,
    pub operation_timeout: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        SweepSettings {
            concurrency: 16,
            operation_timeout: Duration::from_secs(30),
        }
    }
}

impl SweepSettings {
    pub fn from_config(config: &Config) -> Self {
        SweepSettings {
            concurrency: config.sweep_concurrency(),
            operation_timeout: config.sync_operation_timeout(),
        }
    }
}

pub struct MaintenanceSweeper {
    storage: Arc<dyn Storage>,
    settings: SweepSettings,
}

impl MaintenanceSweeper {
    pub fn new(storage: Arc<dyn Storage>, mut settings: SweepSettings) -> Self {
        settings.concurrency = settings.concurrency.clamp(1, MAX_STORE_CONCURRENCY);
        Self { storage, settings }
    }

    /// Apply a public-read ACL to every object under `prefix`.
    pub async fn make_public_all(&self, prefix: &str) -> SweepReport {
        let storage = &self.storage;
        self.sweep("make_public", prefix, |key| async move {
            storage.set_acl(&key, ObjectAcl::PublicRead).await
        })
        .await
    }

    /// Delete every object under `prefix`.
    pub async fn delete_all(&self, prefix: &str) -> SweepReport {
        let storage = &self.storage;
        self.sweep("delete", prefix, |key| async move { storage.delete(&key).await })
            .await
    }

    /// Re-copy every object under `prefix` onto itself as public-read.
    pub async fn copy_as_public_all(&self, prefix: &str) -> SweepReport {
        let storage = &self.storage;
        self.sweep("copy_public", prefix, |key| async move {
            storage
                .copy(&key, &key, CopyOptions::public_in_place())
                .await
        })
        .await
    }

    /// Copy every object under `prefix` to the same relative key under
    /// `dest_prefix`, as public-read. Equal prefixes copy in place.
    pub async fn copy_as_public_all_into(&self, prefix: &str, dest_prefix: &str) -> SweepReport {
        if dest_prefix == prefix {
            return self.copy_as_public_all(prefix).await;
        }
        if dest_prefix.starts_with(prefix) {
            // Copies would be listed again by this same sweep.
            let mut report = SweepReport::default();
            report.record_failure(
                dest_prefix,
                format!("destination prefix lies inside source prefix {}", prefix),
            );
            return report;
        }

        let storage = &self.storage;
        self.sweep("copy_public_into", prefix, |key| async move {
            let dest = format!("{}{}", dest_prefix, &key[prefix.len()..]);
            storage
                .copy(
                    &key,
                    &dest,
                    CopyOptions {
                        acl: Some(ObjectAcl::PublicRead),
                        replace_metadata: false,
                    },
                )
                .await
        })
        .await
    }

    #[tracing::instrument(skip(self, op), fields(concurrency = self.settings.concurrency))]
    async fn sweep<F, Fut>(&self, action: &str, prefix: &str, op: F) -> SweepReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = StorageResult<()>>,
    {
        let start = Instant::now();
        let mut report = SweepReport::default();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = match self.storage.list(prefix, page_token.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(error = %e, pages, "Sweep listing failed; stopping");
                    report.record_failure(prefix, format!("listing failed: {}", e));
                    break;
                }
            };
            pages += 1;

            let timeout = self.settings.operation_timeout;
            let outcomes: Vec<(String, Result<(), String>)> = stream::iter(page.keys)
                .map(|key| {
                    let call = op(key.clone());
                    async move {
                        let outcome = match tokio::time::timeout(timeout, call).await {
                            Ok(Ok(())) => Ok(()),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(_) => Err("timeout".to_string()),
                        };
                        (key, outcome)
                    }
                })
                .buffered(self.settings.concurrency)
                .collect()
                .await;

            for (key, outcome) in outcomes {
                match outcome {
                    Ok(()) => report.record_success(),
                    Err(reason) => {
                        tracing::warn!(key = %key, reason = %reason, "Sweep operation failed");
                        report.record_failure(key, reason);
                    }
                }
            }

            tracing::debug!(
                page = pages,
                succeeded = report.success_count,
                failed = report.error_count,
                "Sweep page processed"
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::info!(
            pages,
            succeeded = report.success_count,
            failed = report.error_count,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Sweep completed"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FaultyStorage;
    use bytes::Bytes;
    use estate_storage::MemoryStorage;
    use std::sync::atomic::Ordering;

    async fn seeded(keys: &[&str], page_size: usize) -> MemoryStorage {
        let storage = MemoryStorage::new().with_page_size(page_size);
        for key in keys {
            storage
                .put(key, Bytes::from_static(b"x"), "image/jpeg")
                .await
                .unwrap();
        }
        storage
    }

    fn sweeper(storage: Arc<dyn Storage>) -> MaintenanceSweeper {
        MaintenanceSweeper::new(
            storage,
            SweepSettings {
                concurrency: 4,
                ..SweepSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn test_make_public_all_across_pages() {
        let keys: Vec<String> = (0..7).map(|i| format!("photos/{i}.jpg")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let storage = seeded(&refs, 3).await;
        storage
            .put("other/x.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();

        let report = sweeper(Arc::new(storage.clone()))
            .make_public_all("photos/")
            .await;

        assert_eq!(report.success_count, 7);
        assert_eq!(report.error_count, 0);
        for key in &keys {
            assert_eq!(storage.object(key).await.unwrap().acl, ObjectAcl::PublicRead);
        }
        assert_eq!(
            storage.object("other/x.jpg").await.unwrap().acl,
            ObjectAcl::Private
        );
    }

    #[tokio::test]
    async fn test_individual_failures_do_not_abort() {
        let storage = FaultyStorage::new(seeded(&["p/a", "p/b", "p/c", "p/d"], 2).await)
            .fail_deletes_containing("p/b");

        let storage = Arc::new(storage);
        let report = sweeper(storage.clone()).delete_all("p/").await;

        assert_eq!(report.success_count, 3);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].key, "p/b");
        assert_eq!(report.errors[0].reason, "Delete failed: AccessDenied");
        assert_eq!(storage.inner.keys().await, vec!["p/b"]);
        assert_eq!(storage.delete_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failed_acl_update_is_tallied() {
        let storage = Arc::new(
            FaultyStorage::new(seeded(&["p/a", "p/b", "p/c"], 2).await).fail_key("p/b"),
        );

        let report = sweeper(storage.clone()).make_public_all("p/").await;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].key, "p/b");
        assert_eq!(report.errors[0].reason, "Setting ACL failed: AccessDenied");
        assert_eq!(
            storage.inner.object("p/b").await.unwrap().acl,
            ObjectAcl::Private
        );
        assert_eq!(
            storage.inner.object("p/c").await.unwrap().acl,
            ObjectAcl::PublicRead
        );
    }

    #[tokio::test]
    async fn test_failed_copy_is_tallied() {
        let storage = Arc::new(
            FaultyStorage::new(seeded(&["p/a", "p/b", "p/c"], 2).await).fail_key("p/b"),
        );

        let report = sweeper(storage.clone()).copy_as_public_all("p/").await;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].key, "p/b");
        assert_eq!(report.errors[0].reason, "Copy failed: AccessDenied");
        assert_eq!(
            storage.inner.object("p/b").await.unwrap().acl,
            ObjectAcl::Private
        );
    }

    #[tokio::test]
    async fn test_failed_copy_into_other_prefix_is_tallied() {
        let storage = Arc::new(
            FaultyStorage::new(seeded(&["old/a", "old/b", "old/c"], 1).await).fail_key("old/b"),
        );

        let report = sweeper(storage.clone())
            .copy_as_public_all_into("old/", "public/")
            .await;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].key, "old/b");
        assert!(storage.inner.contains("public/a").await);
        assert!(!storage.inner.contains("public/b").await);
        assert!(storage.inner.contains("public/c").await);
    }

    #[tokio::test]
    async fn test_listing_failure_ends_sweep_with_tally() {
        let storage = FaultyStorage::new(seeded(&["p/a", "p/b", "p/c"], 2).await)
            .fail_list_after(1);

        let report = sweeper(Arc::new(storage)).make_public_all("p/").await;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].key, "p/");
        assert!(report.errors[0].reason.starts_with("listing failed"));
    }

    #[tokio::test]
    async fn test_copy_as_public_in_place() {
        let storage = seeded(&["p/a", "p/b"], 10).await;
        let report = sweeper(Arc::new(storage.clone()))
            .copy_as_public_all("p/")
            .await;

        assert_eq!(report.success_count, 2);
        assert_eq!(storage.len().await, 2);
        assert_eq!(storage.object("p/a").await.unwrap().acl, ObjectAcl::PublicRead);
    }

    #[tokio::test]
    async fn test_copy_as_public_into_other_prefix() {
        let storage = seeded(&["old/1/a.jpg", "old/2/b.jpg"], 1).await;
        let report = sweeper(Arc::new(storage.clone()))
            .copy_as_public_all_into("old/", "public/")
            .await;

        assert!(report.is_clean());
        assert_eq!(report.success_count, 2);
        let copied = storage.object("public/1/a.jpg").await.unwrap();
        assert_eq!(copied.acl, ObjectAcl::PublicRead);
        assert!(storage.contains("public/2/b.jpg").await);
        assert_eq!(
            storage.object("old/1/a.jpg").await.unwrap().acl,
            ObjectAcl::Private
        );
    }

    #[tokio::test]
    async fn test_copy_into_nested_destination_is_refused() {
        let storage = seeded(&["p/a"], 10).await;
        let report = sweeper(Arc::new(storage.clone()))
            .copy_as_public_all_into("p/", "p/public/")
            .await;

        assert_eq!(report.error_count, 1);
        assert_eq!(report.success_count, 0);
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_prefix_yields_empty_report() {
        let storage = seeded(&[], 10).await;
        let report = sweeper(Arc::new(storage)).delete_all("nothing/").await;
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_concurrency_is_bounded() {
        let keys: Vec<String> = (0..12).map(|i| format!("p/{i:02}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let storage = Arc::new(
            FaultyStorage::new(seeded(&refs, 100).await).with_call_delay(Duration::from_millis(20)),
        );

        let report = sweeper(storage.clone()).make_public_all("p/").await;

        assert_eq!(report.success_count, 12);
        assert!(storage.peak_in_flight.load(Ordering::SeqCst) <= 4);
    }
}
