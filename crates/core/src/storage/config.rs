//! Storage configuration types.

use std::path::PathBuf;

use mediarelay_shared::ObjectStoreConfig;
use serde::{Deserialize, Serialize};

use super::error::StorageError;

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Storage provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// S3-compatible storage: MinIO, Cloudflare R2, AWS S3
    S3 {
        /// S3 endpoint URL.
        endpoint: String,
        /// S3 bucket name.
        bucket: String,
        /// Access key ID.
        access_key_id: String,
        /// Secret access key.
        secret_access_key: String,
        /// Bucket region.
        region: String,
    },
    /// Local filesystem (development only)
    LocalFs {
        /// Root directory path.
        root: PathBuf,
    },
    /// In-process memory (tests only)
    Memory,
}

impl StorageProvider {
    /// Region used when none is configured.
    pub const DEFAULT_REGION: &'static str = "us-east-1";

    /// Create S3-compatible provider.
    #[must_use]
    pub fn s3(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self::S3 {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Create local filesystem provider (development only).
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs { root: root.into() }
    }

    /// Build an S3 provider from operator settings.
    ///
    /// Host, access key, secret key and bucket are required. An explicit
    /// endpoint wins over host and port.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first missing setting.
    pub fn from_settings(settings: &ObjectStoreConfig) -> Result<Self, StorageError> {
        let required = [
            ("host", &settings.host),
            ("access_key", &settings.access_key),
            ("secret_key", &settings.secret_key),
            ("bucket", &settings.bucket),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(StorageError::configuration(format!(
                "missing required object store setting `storage.{name}`"
            )));
        }

        let region = settings
            .region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(Self::DEFAULT_REGION);

        Ok(Self::s3(
            resolve_endpoint(settings),
            settings.bucket.trim(),
            &settings.access_key,
            &settings.secret_key,
            region,
        ))
    }

    /// Get the provider name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::LocalFs { .. } => "local",
            Self::Memory => "memory",
        }
    }

    /// Get the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        match self {
            Self::S3 { bucket, .. } => bucket,
            Self::LocalFs { root } => root.to_str().unwrap_or("local"),
            Self::Memory => "memory",
        }
    }
}

/// Endpoint URL for the configured host, port and TLS toggle.
fn resolve_endpoint(settings: &ObjectStoreConfig) -> String {
    if let Some(endpoint) = settings
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        if endpoint.contains("://") {
            return endpoint.to_string();
        }
        return format!("{}://{endpoint}", scheme(settings.ssl));
    }

    let host = settings.host.trim();
    match settings.port {
        Some(port) => format!("{}://{host}:{port}", scheme(settings.ssl)),
        None => format!("{}://{host}", scheme(settings.ssl)),
    }
}

fn scheme(ssl: bool) -> &'static str {
    if ssl { "https" } else { "http" }
}

/// Storage service configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage provider configuration.
    pub provider: StorageProvider,
    /// Retrieval URL TTL in seconds (default: 7 days).
    pub retrieval_ttl_secs: u64,
    /// Payloads strictly larger than this use the chunked upload path.
    pub multipart_threshold: u64,
    /// Part size for the chunked upload path.
    pub chunk_size: usize,
    /// Parts in flight at once on the chunked upload path.
    pub chunk_concurrency: usize,
}

impl StorageConfig {
    /// Default retrieval URL TTL: 7 days.
    pub const DEFAULT_RETRIEVAL_TTL: u64 = 7 * 24 * 60 * 60;
    /// Default multipart threshold: 50 MiB.
    pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 50 * MIB;
    /// Default part size: 5 MiB.
    #[allow(clippy::cast_possible_truncation)]
    pub const DEFAULT_CHUNK_SIZE: usize = (5 * MIB) as usize;
    /// Default parts in flight.
    pub const DEFAULT_CHUNK_CONCURRENCY: usize = 4;

    /// Create a new storage config with default settings.
    #[must_use]
    pub fn new(provider: StorageProvider) -> Self {
        Self {
            provider,
            retrieval_ttl_secs: Self::DEFAULT_RETRIEVAL_TTL,
            multipart_threshold: Self::DEFAULT_MULTIPART_THRESHOLD,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            chunk_concurrency: Self::DEFAULT_CHUNK_CONCURRENCY,
        }
    }

    /// Set retrieval URL TTL.
    #[must_use]
    pub fn with_retrieval_ttl(mut self, secs: u64) -> Self {
        self.retrieval_ttl_secs = secs;
        self
    }

    /// Set the size above which uploads are chunked.
    #[must_use]
    pub fn with_multipart_threshold(mut self, bytes: u64) -> Self {
        self.multipart_threshold = bytes;
        self
    }

    /// Set the chunk size of the chunked path.
    #[must_use]
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Upload path for a payload of `size` bytes.
    #[must_use]
    pub fn strategy_for(&self, size: u64) -> UploadStrategy {
        if size > self.multipart_threshold {
            UploadStrategy::Chunked
        } else {
            UploadStrategy::SingleRequest
        }
    }
}

/// Upload path taken for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// Whole payload in one request.
    SingleRequest,
    /// Payload streamed in fixed-size parts.
    Chunked,
}

impl UploadStrategy {
    /// Label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleRequest => "single_request",
            Self::Chunked => "chunked",
        }
    }
}
