//! Local media fetcher.
//!
//! Copies a media file named by the feed into the media directory:
//!
//! ```text
//! {media_dir}/{sender}/photo/photo_{YYYYMMDD_HHMMSS}.jpg
//! {media_dir}/{sender}/{document|video}/{YYYYMMDD}/{original name | doc_{YYYYMMDD_HHMMSS}}
//! ```
//!
//! Two photos from one sender within the same second share a path; the later
//! copy wins.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use mediarelay_core::relay::{DownloadedMedia, FetchError, MediaFetcher, MediaKind, MediaRef};
use tracing::debug;

/// Fetches media whose locator is a path on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalMediaFetcher {
    media_dir: PathBuf,
    now: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl LocalMediaFetcher {
    /// Fetcher writing under `media_dir`.
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
            now: local_now,
        }
    }

    /// Replace the wall clock used for timestamped names.
    #[must_use]
    pub fn with_clock(mut self, now: fn() -> NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    /// Root of the local layout.
    #[must_use]
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Create the media directory if it is missing.
    pub async fn ensure_media_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.media_dir).await
    }
}

/// Local path for a media item received at `now`.
pub fn destination(
    media_dir: &Path,
    sender: &str,
    kind: MediaKind,
    original_name: Option<&str>,
    now: NaiveDateTime,
) -> PathBuf {
    let sender_dir = media_dir.join(path_component(sender));
    match kind {
        MediaKind::Photo => sender_dir
            .join(kind.as_str())
            .join(format!("photo_{}.jpg", now.format("%Y%m%d_%H%M%S"))),
        MediaKind::Document | MediaKind::Video => {
            let name = original_name
                .map(path_component)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("doc_{}", now.format("%Y%m%d_%H%M%S")));
            sender_dir
                .join(kind.as_str())
                .join(now.format("%Y%m%d").to_string())
                .join(name)
        }
    }
}

/// Kind implied by a file extension when the feed does not announce one.
pub fn infer_kind(path: &Path) -> MediaKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg" | "png" | "webp" | "gif") => MediaKind::Photo,
        Some("mp4" | "mov" | "webm" | "mkv") => MediaKind::Video,
        _ => MediaKind::Document,
    }
}

// Keeps names from escaping their directory.
fn path_component(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    match base {
        "." | ".." => String::new(),
        other => other.to_owned(),
    }
}

fn source_path(locator: &str) -> Result<PathBuf, FetchError> {
    if let Some(path) = locator.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if let Some((scheme, _)) = locator.split_once("://") {
        return Err(FetchError::Unsupported(format!(
            "{scheme} locators are not fetchable from disk"
        )));
    }
    if locator.trim().is_empty() {
        return Err(FetchError::Unsupported("empty media locator".into()));
    }
    Ok(PathBuf::from(locator))
}

#[async_trait]
impl MediaFetcher for LocalMediaFetcher {
    async fn fetch(&self, media: &MediaRef, sender: &str) -> Result<DownloadedMedia, FetchError> {
        let source = source_path(&media.locator)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(FetchError::NotFound(source.display().to_string()));
        }

        let kind = media.kind.unwrap_or_else(|| infer_kind(&source));
        let original = media.file_name.clone().or_else(|| {
            source
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_owned)
        });

        let target = destination(
            &self.media_dir,
            sender,
            kind,
            original.as_deref(),
            (self.now)(),
        );
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let copied = tokio::fs::copy(&source, &target).await?;
        debug!(
            source = %source.display(),
            target = %target.display(),
            bytes = copied,
            "Fetched media"
        );

        let mut downloaded = DownloadedMedia::new(target, kind);
        if let Some(name) = original {
            downloaded = downloaded.with_original_name(name);
        }
        Ok(downloaded)
    }
}
