//! Collaborator traits of the relay pipeline.
//!
//! The message source, media fetcher, sender directory and object store are
//! implemented outside this module; the dispatcher and workers only see these
//! traits.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::{FetchError, NotifyError, ResolveError, SourceError};
use super::types::{DownloadedMedia, InboundEvent, MediaRef, SenderId};
use crate::storage::{StorageError, StorageService, UploadResult};

/// Byte stream handed to the object store.
pub type UploadBody = Box<dyn AsyncRead + Unpin + Send>;

/// Maps raw sender identifiers to display names.
pub trait PeerResolver: Send + Sync {
    /// Display name for `sender`.
    fn resolve(&self, sender: &SenderId) -> Result<String, ResolveError>;
}

/// Downloads media attachments to local disk.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch `media` for `sender` and report where it landed.
    async fn fetch(&self, media: &MediaRef, sender: &str) -> Result<DownloadedMedia, FetchError>;
}

/// Sends text back to the operator's own chat.
#[async_trait]
pub trait SelfNotifier: Send + Sync {
    /// Send `text` to self.
    async fn notify_self(&self, text: &str) -> Result<(), NotifyError>;
}

/// Stores uploaded media and mints retrieval URLs.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload `size` bytes from `body` under `key`.
    async fn store(
        &self,
        key: &str,
        body: UploadBody,
        size: u64,
        content_type: &str,
    ) -> Result<UploadResult, StorageError>;
}

/// Stream of inbound events.
#[async_trait]
pub trait MessageSource: Send {
    /// Next event, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> Result<Option<InboundEvent>, SourceError>;
}

#[async_trait]
impl MediaStore for StorageService {
    async fn store(
        &self,
        key: &str,
        body: UploadBody,
        size: u64,
        content_type: &str,
    ) -> Result<UploadResult, StorageError> {
        self.upload(key, body, size, content_type).await
    }
}
