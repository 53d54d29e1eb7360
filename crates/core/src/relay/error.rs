//! Relay error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::types::SenderId;
use crate::storage::StorageError;

/// I/O-bound stage of a relay worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Media fetch.
    Download,
    /// Object store upload.
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Download => "download",
            Self::Upload => "upload",
        })
    }
}

/// Terminal failure of one media item.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The media fetcher failed.
    #[error("download media: {0}")]
    Download(#[source] FetchError),

    /// The downloaded file could not be stat'ed.
    #[error("get file info: {0}")]
    Stat(#[source] std::io::Error),

    /// The downloaded file could not be opened.
    #[error("open file: {0}")]
    Open(#[source] std::io::Error),

    /// The object store rejected the upload.
    #[error("upload file: {0}")]
    Upload(#[source] StorageError),

    /// The local file could not be deleted after upload.
    #[error("remove file: {0}")]
    Remove(#[source] std::io::Error),

    /// A transfer exceeded the configured timeout.
    #[error("{stage} timed out after {}s", .after.as_secs())]
    TimedOut {
        /// Stage that timed out.
        stage: Stage,
        /// Configured limit.
        after: Duration,
    },

    /// The process is shutting down.
    #[error("{stage} cancelled")]
    Cancelled {
        /// Stage that was interrupted.
        stage: Stage,
    },
}

/// Media fetcher failures.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The reference points at something the fetcher cannot download.
    #[error("unsupported media: {0}")]
    Unsupported(String),

    /// The referenced media does not exist.
    #[error("media not found: {0}")]
    NotFound(String),

    /// Local I/O failed while writing the media.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transfer itself failed.
    #[error("transfer failed: {0}")]
    Transfer(String),
}

/// Sender resolution failures.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No display name is known for the sender.
    #[error("peer {0} not found")]
    PeerNotFound(SenderId),

    /// The lookup itself failed.
    #[error("peer lookup failed: {0}")]
    Lookup(String),
}

/// Reply-to-self failures.
#[derive(Debug, Error)]
#[error("send to self: {0}")]
pub struct NotifyError(pub String);

/// Message source failures.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading from the source failed.
    #[error("read inbound event: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be decoded.
    #[error("decode inbound event at line {line}: {reason}")]
    Decode {
        /// 1-based record number.
        line: usize,
        /// Decoder message.
        reason: String,
    },
}

/// Per-event dispatch failures.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The sender could not be resolved; the event is dropped.
    #[error("find peer: {0}")]
    PeerResolution(#[from] ResolveError),

    /// The pool no longer admits work.
    #[error("relay pool is closed")]
    PoolClosed,
}
