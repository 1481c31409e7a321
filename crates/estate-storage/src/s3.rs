use crate::keys::{clamp_page_size, validate_key, MAX_PAGE_SIZE};
use crate::traits::{CopyOptions, ListPage, ObjectAcl, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{MetadataDirective, ObjectCannedAcl};
use aws_sdk_s3::Client;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left as-is in a `CopySource` header value.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
    page_size: usize,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `max_attempts` - Attempts per call under the SDK's standard retry policy
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        max_attempts: u32,
    ) -> StorageResult<Self> {
        if bucket.trim().is_empty() {
            return Err(StorageError::ConfigError("S3 bucket name is empty".to_string()));
        }

        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(region.clone()));

        let retry_config = RetryConfig::standard().with_max_attempts(max_attempts.max(1));

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config.clone())
            .load()
            .await;

        // Configure S3 client with custom endpoint if provided (for S3-compatible providers)
        let client = if let Some(ref endpoint) = endpoint_url {
            let mut s3_config_builder = aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .endpoint_url(endpoint)
                .region(config.region().cloned())
                .retry_config(retry_config);
            if let Some(provider) = config.credentials_provider() {
                s3_config_builder = s3_config_builder.credentials_provider(provider);
            }
            // Path-style addressing is required for MinIO and most S3-compatible providers
            s3_config_builder = s3_config_builder.force_path_style(true);

            Client::from_conf(s3_config_builder.build())
        } else {
            Client::new(&config)
        };

        tracing::info!(
            bucket = %bucket,
            region = %region,
            endpoint = ?endpoint_url,
            max_attempts = max_attempts,
            "S3 storage initialized"
        );

        Ok(S3Storage {
            client,
            bucket,
            region,
            endpoint_url,
            page_size: MAX_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = clamp_page_size(page_size);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn canned_acl(acl: ObjectAcl) -> ObjectCannedAcl {
        match acl {
            ObjectAcl::Private => ObjectCannedAcl::Private,
            ObjectAcl::PublicRead => ObjectCannedAcl::PublicRead,
        }
    }

    fn copy_source(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(key, COPY_SOURCE)
        )
    }
}

/// Map an SDK failure onto the storage taxonomy. Throttling, 5xx responses,
/// timeouts and dispatch failures are transient; the rest uses `failed`.
fn map_sdk_error<E>(
    err: &SdkError<E, HttpResponse>,
    key: &str,
    failed: fn(String) -> StorageError,
) -> StorageError
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
{
    let message = DisplayErrorContext(err).to_string();
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::Unavailable(message)
        }
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            let code = context.err().code().unwrap_or_default();
            if status == 404 || code == "NoSuchKey" || code == "NotFound" {
                StorageError::NotFound(key.to_string())
            } else if status == 429
                || status >= 500
                || code == "SlowDown"
                || code == "RequestTimeout"
                || code == "ThrottlingException"
            {
                StorageError::Unavailable(message)
            } else {
                failed(message)
            }
        }
        _ => failed(message),
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn list(&self, prefix: &str, page_token: Option<&str>) -> StorageResult<ListPage> {
        let start = std::time::Instant::now();

        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(self.page_size as i32)
            .set_continuation_token(page_token.map(String::from))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %DisplayErrorContext(&e),
                    bucket = %self.bucket,
                    prefix = %prefix,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 list failed"
                );
                map_sdk_error(&e, prefix, StorageError::ListFailed)
            })?;

        let keys: Vec<String> = response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(String::from))
            .collect();

        let next_page_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(String::from)
        } else {
            None
        };

        tracing::info!(
            bucket = %self.bucket,
            prefix = %prefix,
            count = keys.len(),
            has_more = next_page_token.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 list successful"
        );

        Ok(ListPage {
            keys,
            next_page_token,
        })
    }

    async fn put(&self, storage_key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        validate_key(storage_key)?;
        let size = data.len() as u64;
        let body = ByteStream::from(data);
        let start = std::time::Instant::now();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(storage_key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %DisplayErrorContext(&e),
                    bucket = %self.bucket,
                    key = %storage_key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                map_sdk_error(&e, storage_key, StorageError::UploadFailed)
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(storage_key.to_string())
    }

    async fn copy(
        &self,
        source_key: &str,
        dest_key: &str,
        options: CopyOptions,
    ) -> StorageResult<()> {
        validate_key(source_key)?;
        validate_key(dest_key)?;
        let start = std::time::Instant::now();

        let mut request = self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(self.copy_source(source_key))
            .key(dest_key);

        if let Some(acl) = options.acl {
            request = request.acl(Self::canned_acl(acl));
        }

        if options.replace_metadata {
            // REPLACE drops the stored metadata, so carry it over explicitly.
            let head = self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(source_key)
                .send()
                .await
                .map_err(|e| map_sdk_error(&e, source_key, StorageError::CopyFailed))?;

            request = request
                .metadata_directive(MetadataDirective::Replace)
                .set_content_type(head.content_type().map(String::from))
                .set_cache_control(head.cache_control().map(String::from))
                .set_metadata(head.metadata().cloned());
        }

        request.send().await.map_err(|e| {
            tracing::error!(
                error = %DisplayErrorContext(&e),
                bucket = %self.bucket,
                from_key = %source_key,
                to_key = %dest_key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 copy failed"
            );
            map_sdk_error(&e, source_key, StorageError::CopyFailed)
        })?;

        tracing::info!(
            bucket = %self.bucket,
            from_key = %source_key,
            to_key = %dest_key,
            acl = ?options.acl,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 copy successful"
        );

        Ok(())
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        validate_key(storage_key)?;
        let start = std::time::Instant::now();

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(storage_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %DisplayErrorContext(&e),
                    bucket = %self.bucket,
                    key = %storage_key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                map_sdk_error(&e, storage_key, StorageError::DeleteFailed)
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn set_acl(&self, storage_key: &str, acl: ObjectAcl) -> StorageResult<()> {
        validate_key(storage_key)?;
        let start = std::time::Instant::now();

        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(storage_key)
            .acl(Self::canned_acl(acl))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %DisplayErrorContext(&e),
                    bucket = %self.bucket,
                    key = %storage_key,
                    acl = %acl,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 set ACL failed"
                );
                map_sdk_error(&e, storage_key, StorageError::AclFailed)
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            acl = %acl,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 set ACL successful"
        );

        Ok(())
    }

    /// For AWS S3 the virtual-hosted URL; for S3-compatible providers a
    /// path-style URL under the endpoint.
    fn public_url(&self, key: &str) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            )
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
