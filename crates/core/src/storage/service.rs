//! Storage service implementation using Apache OpenDAL.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, TryStreamExt};
use opendal::{ErrorKind, Operator, Writer, services};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::bucket::{BucketStatus, ensure_bucket};
use super::config::{StorageConfig, StorageProvider, UploadStrategy};
use super::error::StorageError;

/// Presigned URL for download.
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    /// The presigned URL.
    pub url: String,
    /// HTTP method to use.
    pub method: String,
    /// When the URL expires.
    pub expires_at: DateTime<Utc>,
}

/// A stored object together with its retrieval URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Object key in the bucket.
    pub key: String,
    /// Presigned retrieval URL.
    pub url: String,
    /// When the retrieval URL expires.
    pub expires_at: DateTime<Utc>,
    /// Stored size in bytes.
    pub size: u64,
    /// Upload path that was taken.
    pub strategy: UploadStrategy,
}

/// Metadata about a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Storage key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Content type, when the provider records one.
    pub content_type: Option<String>,
    /// Entity tag, when the provider records one.
    pub etag: Option<String>,
}

impl ObjectInfo {
    fn from_metadata(key: &str, meta: &opendal::Metadata) -> Self {
        Self {
            key: key.to_string(),
            size: meta.content_length(),
            content_type: meta.content_type().map(String::from),
            etag: meta.etag().map(String::from),
        }
    }
}

/// Object store client for relayed media.
pub struct StorageService {
    operator: Operator,
    config: StorageConfig,
}

impl StorageService {
    /// Create a new storage service from configuration.
    ///
    /// Does not touch the network; use [`StorageService::connect`] at startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider cannot be initialized.
    pub fn from_config(config: StorageConfig) -> Result<Self, StorageError> {
        let operator = Self::create_operator(&config.provider)?;
        Ok(Self { operator, config })
    }

    /// Create the service, ensure the bucket exists and verify it is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is misconfigured, the bucket cannot
    /// be created, or the bucket cannot be listed with the configured credentials.
    pub async fn connect(config: StorageConfig) -> Result<Self, StorageError> {
        let status = ensure_bucket(&config.provider).await?;
        let service = Self::from_config(config)?;

        service
            .operator
            .check()
            .await
            .map_err(|e| StorageError::provisioning(format!("bucket is not reachable: {e}")))?;

        info!(
            provider = service.provider_name(),
            bucket = service.bucket(),
            created = status == BucketStatus::Created,
            "Object store ready"
        );
        Ok(service)
    }

    /// Create OpenDAL operator from provider config.
    fn create_operator(provider: &StorageProvider) -> Result<Operator, StorageError> {
        let operator = match provider {
            StorageProvider::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
            } => {
                let builder = services::S3::default()
                    .root("/")
                    .endpoint(endpoint)
                    .bucket(bucket)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key)
                    .region(region)
                    .disable_config_load()
                    .disable_ec2_metadata();

                Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish()
            }
            StorageProvider::LocalFs { root } => {
                let builder = services::Fs::default().root(
                    root.to_str()
                        .ok_or_else(|| StorageError::configuration("invalid path"))?,
                );

                Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish()
            }
            StorageProvider::Memory => Operator::new(services::Memory::default())
                .map_err(|e| StorageError::configuration(e.to_string()))?
                .finish(),
        };
        Ok(operator)
    }

    /// Upload a payload of known length and mint its retrieval URL.
    ///
    /// Payloads above the multipart threshold (50 MiB by default) are
    /// streamed in parts; smaller ones go out in a single request. Uploading
    /// to an existing key overwrites it.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be read, the write fails, or the
    /// object was stored but no URL could be minted.
    pub async fn upload<R>(
        &self,
        key: &str,
        reader: R,
        size: u64,
        content_type: &str,
    ) -> Result<UploadResult, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let strategy = self.put_object(key, reader, size, content_type).await?;
        let presigned = self.retrieval_url(key).await?;

        Ok(UploadResult {
            key: key.to_string(),
            url: presigned.url,
            expires_at: presigned.expires_at,
            size,
            strategy,
        })
    }

    /// Store a payload of known length without minting a URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the payload is shorter than
    /// `size`, or the write fails.
    pub async fn put_object<R>(
        &self,
        key: &str,
        reader: R,
        size: u64,
        content_type: &str,
    ) -> Result<UploadStrategy, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        validate_key(key)?;

        let strategy = self.config.strategy_for(size);
        debug!(key, size, strategy = strategy.as_str(), "Uploading object");

        match strategy {
            UploadStrategy::SingleRequest => {
                self.put_single(key, reader, size, content_type).await?;
            }
            UploadStrategy::Chunked => {
                self.put_chunked(key, reader, size, content_type).await?;
            }
        }
        Ok(strategy)
    }

    async fn put_single<R>(
        &self,
        key: &str,
        reader: R,
        size: u64,
        content_type: &str,
    ) -> Result<(), StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
        reader.take(size).read_to_end(&mut buf).await?;
        check_length(size, buf.len() as u64)?;

        let mut write = self.operator.write_with(key, buf);
        if self.supports_content_type() {
            write = write.content_type(content_type);
        }
        write.await?;
        Ok(())
    }

    async fn put_chunked<R>(
        &self,
        key: &str,
        reader: R,
        size: u64,
        content_type: &str,
    ) -> Result<(), StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut open = self
            .operator
            .writer_with(key)
            .chunk(self.config.chunk_size)
            .concurrent(self.config.chunk_concurrency);
        if self.supports_content_type() {
            open = open.content_type(content_type);
        }
        let mut upload = PendingUpload::new(key, open.await?);

        if let Err(err) = self.stream_parts(upload.writer()?, reader, size).await {
            upload.abort().await;
            return Err(err);
        }
        upload.close().await
    }

    async fn stream_parts<R>(
        &self,
        writer: &mut Writer,
        reader: R,
        size: u64,
    ) -> Result<(), StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut parts = ReaderStream::with_capacity(reader.take(size), self.config.chunk_size);
        let mut written = 0u64;
        while let Some(part) = parts.next().await {
            let part = part?;
            written += part.len() as u64;
            writer.write(part).await?;
        }
        check_length(size, written)
    }

    fn supports_content_type(&self) -> bool {
        self.operator.info().full_capability().write_with_content_type
    }

    /// Generate presigned URL for download.
    ///
    /// Each call signs a fresh URL; every URL for a key reads the same object.
    ///
    /// # Errors
    ///
    /// Returns an error if presigning is not supported or fails.
    pub async fn presign_download(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        validate_key(key)?;

        let presigned = self
            .operator
            .presign_read(key, ttl)
            .await
            .map_err(StorageError::from_presign)?;

        Ok(PresignedUrl {
            url: presigned.uri().to_string(),
            method: presigned.method().to_string(),
            expires_at: Utc::now()
                + chrono::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
        })
    }

    /// Presigned URL with the configured retrieval TTL (7 days by default).
    ///
    /// # Errors
    ///
    /// Returns an error if presigning is not supported or fails.
    pub async fn retrieval_url(&self, key: &str) -> Result<PresignedUrl, StorageError> {
        self.presign_download(key, Duration::from_secs(self.config.retrieval_ttl_secs))
            .await
    }

    /// List objects under a prefix, recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    pub async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let entries = self.operator.list_with(prefix).recursive(true).await?;

        Ok(entries
            .iter()
            .filter(|entry| !entry.metadata().is_dir())
            .map(|entry| ObjectInfo::from_metadata(entry.path(), entry.metadata()))
            .collect())
    }

    /// Fetch an object as a stream of byte chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be opened; later failures
    /// surface as stream items.
    pub async fn get(
        &self,
        key: &str,
    ) -> Result<impl Stream<Item = Result<Bytes, StorageError>> + Send + 'static, StorageError>
    {
        validate_key(key)?;

        let reader = self.operator.reader(key).await?;
        let stream = reader.into_bytes_stream(..).await?;
        Ok(stream.map_err(StorageError::from))
    }

    /// Fetch a whole object into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist or cannot be read.
    pub async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        Ok(self.operator.read(key).await?.to_vec())
    }

    /// Get metadata for an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist or cannot be accessed.
    pub async fn stat(&self, key: &str) -> Result<ObjectInfo, StorageError> {
        validate_key(key)?;
        let meta = self.operator.stat(key).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::not_found(key)
            } else {
                e.into()
            }
        })?;
        Ok(ObjectInfo::from_metadata(key, &meta))
    }

    /// Delete an object from storage.
    ///
    /// Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.operator.delete(key).await.map_err(StorageError::from)
    }

    /// Check if an object exists in storage.
    pub async fn exists(&self, key: &str) -> bool {
        self.operator.stat(key).await.is_ok()
    }

    /// Collision-resistant object name: a nanosecond timestamp goes before the extension.
    ///
    /// `report.pdf` becomes `report_1718000000123456789.pdf`.
    #[must_use]
    pub fn generate_object_name(original_filename: &str) -> String {
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        stamped_name(original_filename, stamp)
    }

    /// Get the storage provider name.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.config.provider.name()
    }

    /// Get the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        self.config.provider.bucket()
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

fn stamped_name(original: &str, stamp: i64) -> String {
    let base_start = original.rfind('/').map_or(0, |i| i + 1);
    match original[base_start..].rfind('.') {
        Some(dot) => {
            let (stem, ext) = original.split_at(base_start + dot);
            format!("{stem}_{stamp}{ext}")
        }
        None => format!("{original}_{stamp}"),
    }
}

/// A chunked upload that has not completed.
///
/// Dropped while still open (timeout, cancellation), it aborts the upload
/// on the runtime so the parts already sent are discarded.
struct PendingUpload {
    key: String,
    writer: Option<Writer>,
}

impl PendingUpload {
    fn new(key: &str, writer: Writer) -> Self {
        Self {
            key: key.to_owned(),
            writer: Some(writer),
        }
    }

    fn writer(&mut self) -> Result<&mut Writer, StorageError> {
        self.writer
            .as_mut()
            .ok_or_else(|| StorageError::Operation(format!("upload of {} already finished", self.key)))
    }

    async fn abort(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            abort_writer(&self.key, &mut writer).await;
        }
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.writer()?.close().await?;
        self.writer = None;
        Ok(())
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { abort_writer(&key, &mut writer).await });
            }
            Err(_) => warn!(key = %key, "Unfinished upload left behind, no runtime to abort it"),
        }
    }
}

async fn abort_writer(key: &str, writer: &mut Writer) {
    match writer.abort().await {
        Ok(()) => debug!(key, "Aborted unfinished upload"),
        Err(err) => warn!(key, error = %err, "Failed to abort unfinished upload"),
    }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.starts_with('/') || key.ends_with('/') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn check_length(expected: u64, actual: u64) -> Result<(), StorageError> {
    if expected == actual {
        Ok(())
    } else {
        Err(StorageError::LengthMismatch { expected, actual })
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "service_props.rs"]
mod property_tests;
