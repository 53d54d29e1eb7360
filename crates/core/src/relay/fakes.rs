//! In-process collaborators for relay tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{Layer, layer::SubscriberExt};

use super::ACTIVITY_TARGET;
use super::error::{FetchError, NotifyError, ResolveError};
use super::ports::{MediaFetcher, MediaStore, PeerResolver, SelfNotifier, UploadBody};
use super::types::{DownloadedMedia, MediaKind, MediaRef, SenderId};
use crate::storage::{StorageConfig, StorageError, StorageProvider, UploadResult};

/// Activity lines emitted on the current thread while the guard lives.
#[derive(Clone, Default)]
pub struct ActivityLog(Arc<Mutex<Vec<u8>>>);

struct ActivityWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for ActivityWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ActivityLog {
    pub fn capture() -> (Self, DefaultGuard) {
        let log = Self::default();
        let buffer = Arc::clone(&log.0);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(move || ActivityWriter(Arc::clone(&buffer)))
            .with_ansi(false)
            .without_time()
            .with_level(false)
            .with_target(false)
            .with_filter(Targets::new().with_target(ACTIVITY_TARGET, LevelFilter::INFO));
        let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(layer));
        (log, guard)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(|line| line.trim().to_owned())
            .collect()
    }
}

pub struct Directory(HashMap<String, String>);

impl Directory {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(id, name)| ((*id).to_owned(), (*name).to_owned()))
                .collect(),
        )
    }
}

impl PeerResolver for Directory {
    fn resolve(&self, sender: &SenderId) -> Result<String, ResolveError> {
        self.0
            .get(sender.as_str())
            .cloned()
            .ok_or_else(|| ResolveError::PeerNotFound(sender.clone()))
    }
}

/// Writes `size` bytes under `root/{sender}/{kind}/{name}` for every fetch.
pub struct StagedFetcher {
    root: PathBuf,
    size: u64,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StagedFetcher {
    pub fn new(root: &Path, size: u64) -> Self {
        Self {
            root: root.to_path_buf(),
            size,
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_owned());
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn stage(&self, media: &MediaRef, sender: &str) -> Result<DownloadedMedia, FetchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(FetchError::Transfer(reason.clone()));
        }

        let kind = media.kind.unwrap_or(MediaKind::Document);
        let name = media.file_name.clone().unwrap_or_else(|| {
            Path::new(&media.locator)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("blob")
                .to_owned()
        });

        let dir = self.root.join(sender).join(kind.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&name);

        if self.size <= 1024 * 1024 {
            #[allow(clippy::cast_possible_truncation)]
            let body: Vec<u8> = (0..self.size).map(|i| (i % 251) as u8).collect();
            tokio::fs::write(&path, body).await?;
        } else {
            let file = std::fs::File::create(&path)?;
            file.set_len(self.size)?;
        }

        Ok(DownloadedMedia::new(path, kind).with_original_name(name))
    }
}

#[async_trait]
impl MediaFetcher for StagedFetcher {
    async fn fetch(&self, media: &MediaRef, sender: &str) -> Result<DownloadedMedia, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.stage(media, sender).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCall {
    pub key: String,
    pub size: u64,
    pub content_type: String,
    pub body: Option<Vec<u8>>,
}

/// Records uploads and answers with a deterministic URL.
pub struct RecordingStore {
    config: StorageConfig,
    read_body: bool,
    delete_before_ack: Mutex<Option<PathBuf>>,
    calls: Mutex<Vec<StoredCall>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            config: StorageConfig::new(StorageProvider::Memory),
            read_body: false,
            delete_before_ack: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reading_bodies(mut self) -> Self {
        self.read_body = true;
        self
    }

    /// Remove `path` while handling the upload, so a later local cleanup fails.
    pub fn deleting(self, path: PathBuf) -> Self {
        *self.delete_before_ack.lock().unwrap() = Some(path);
        self
    }

    pub fn calls(&self) -> Vec<StoredCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStore for RecordingStore {
    async fn store(
        &self,
        key: &str,
        mut body: UploadBody,
        size: u64,
        content_type: &str,
    ) -> Result<UploadResult, StorageError> {
        let body = if self.read_body {
            let mut buf = Vec::new();
            body.read_to_end(&mut buf).await?;
            Some(buf)
        } else {
            None
        };

        let doomed = self.delete_before_ack.lock().unwrap().take();
        if let Some(path) = doomed {
            tokio::fs::remove_file(path).await?;
        }

        self.calls.lock().unwrap().push(StoredCall {
            key: key.to_owned(),
            size,
            content_type: content_type.to_owned(),
            body,
        });

        Ok(UploadResult {
            key: key.to_owned(),
            url: format!("https://store.test/media/{key}?X-Amz-Expires=604800"),
            expires_at: Utc::now() + chrono::Duration::days(7),
            size,
            strategy: self.config.strategy_for(size),
        })
    }
}

pub struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            fail: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SelfNotifier for RecordingNotifier {
    async fn notify_self(&self, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(text.to_owned());
        if self.fail {
            return Err(NotifyError("flood wait".into()));
        }
        Ok(())
    }
}
