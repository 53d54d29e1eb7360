//! Relay pipeline types and data structures.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::UploadResult;

/// Raw sender identifier as delivered by the message source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SenderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Media classification used in object keys and local paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Compressed photo.
    Photo,
    /// Any file sent as a document.
    Document,
    /// Document carrying video attributes.
    Video,
}

impl MediaKind {
    /// Bare token used in keys, e.g. `photo`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Document => "document",
            Self::Video => "video",
        }
    }

    /// Parse a bare token, tolerating a leading dot.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "photo" => Some(Self::Photo),
            "document" => Some(Self::Document),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// MIME type for a file of this kind, judged by its extension first.
    #[must_use]
    pub fn content_type(&self, file_name: &str) -> &'static str {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("mp4") => "video/mp4",
            Some("mov") => "video/quicktime",
            Some("webm") => "video/webm",
            Some("mkv") => "video/x-matroska",
            Some("mp3") => "audio/mpeg",
            Some("ogg" | "oga") => "audio/ogg",
            Some("pdf") => "application/pdf",
            Some("zip") => "application/zip",
            Some("txt") => "text/plain",
            Some("json") => "application/json",
            _ => match self {
                Self::Photo => "image/jpeg",
                Self::Video => "video/mp4",
                Self::Document => "application/octet-stream",
            },
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a media attachment.
///
/// Only the fetcher interprets it; the dispatcher and worker pass it through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Where the fetcher finds the bytes.
    #[serde(alias = "path")]
    pub locator: String,
    /// Kind announced by the source.
    #[serde(default)]
    pub kind: Option<MediaKind>,
    /// Original filename announced by the source.
    #[serde(default)]
    pub file_name: Option<String>,
}

impl MediaRef {
    /// Reference with only a locator.
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            kind: None,
            file_name: None,
        }
    }

    /// Set the announced kind.
    #[must_use]
    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the announced original filename.
    #[must_use]
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// One message notification from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Raw sender identifier.
    pub sender_id: SenderId,
    /// Display name as carried on the event.
    #[serde(default)]
    pub sender_name: String,
    /// Message text.
    #[serde(default)]
    pub text: String,
    /// Attached media, if any.
    #[serde(default)]
    pub media: Option<MediaRef>,
}

impl InboundEvent {
    /// Text-only event.
    #[must_use]
    pub fn text(sender_id: impl Into<String>, sender_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: SenderId::new(sender_id),
            sender_name: sender_name.into(),
            text: text.into(),
            media: None,
        }
    }

    /// Attach media to the event.
    #[must_use]
    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media = Some(media);
        self
    }
}

/// A media item written to local disk by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    /// Local file path.
    pub path: PathBuf,
    /// Size in bytes, filled in once the worker has stat'ed the file.
    pub size: u64,
    /// Classification.
    pub kind: MediaKind,
    /// Original filename, when the source provided one.
    pub original_name: Option<String>,
}

impl DownloadedMedia {
    /// Media at `path` with unknown size.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            size: 0,
            kind,
            original_name: None,
        }
    }

    /// Set the original filename.
    #[must_use]
    pub fn with_original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }

    /// Base name of the local file.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Object key for an uploaded media item.
///
/// Format: `{sender}/{kind}/{file_name}`
#[must_use]
pub fn object_key(sender: &str, kind: MediaKind, file_name: &str) -> String {
    format!("{sender}/{}/{file_name}", kind.as_str())
}

/// Work handed to a relay worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayJob {
    /// Resolved sender display name.
    pub sender: String,
    /// Media to relay.
    pub media: MediaRef,
}

/// What happened to the local copy after upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// Auto-delete is off; the file stays on disk.
    Kept,
    /// The file was deleted.
    Removed,
    /// Deletion was attempted and failed.
    Failed(String),
}

/// Outcome of the best-effort confirmation sent to self.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Confirmations are off.
    Disabled,
    /// The message source accepted the reply.
    Sent,
    /// The reply was attempted and failed.
    Failed(String),
}

/// Successful relay of one media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    /// Sender display name.
    pub sender: String,
    /// Local media that was uploaded.
    pub media: DownloadedMedia,
    /// Stored object and its URL.
    pub upload: UploadResult,
    /// Local file cleanup.
    pub removal: Removal,
    /// Confirmation to self.
    pub confirmation: Confirmation,
}
