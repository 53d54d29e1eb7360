//! Object store client for relayed media, built on Apache OpenDAL.
//!
//! Supports:
//! - S3-compatible: MinIO, Cloudflare R2, AWS S3
//! - Local filesystem (development only)
//! - In-process memory (tests)
//!
//! # Upload tiers
//!
//! ```text
//! size <= 50 MiB  ──►  op.write_with(key, buf)            (one request)
//! size  > 50 MiB  ──►  op.writer_with(key).chunk(5 MiB)   (multipart)
//!                           │
//!                           ▼
//!                 op.presign_read(key, 7 days)
//! ```

mod bucket;
mod config;
mod error;
mod service;

pub use bucket::{BucketStatus, ensure_bucket};
pub use config::{MIB, StorageConfig, StorageProvider, UploadStrategy};
pub use error::StorageError;
pub use service::{ObjectInfo, PresignedUrl, StorageService, UploadResult};
