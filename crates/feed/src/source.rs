//! JSON-lines inbound feed.
//!
//! One [`InboundEvent`] per line:
//!
//! ```text
//! {"sender_id":"42","sender_name":"alice","text":"hi","media":{"path":"/tmp/a.jpg","kind":"photo"}}
//! ```
//!
//! Blank lines are skipped. A line that is not UTF-8 or not an event is
//! reported with its 1-based line number and reading continues with the next
//! line.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mediarelay_core::relay::{InboundEvent, MessageSource, SourceError};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split, Stdin};
use tracing::trace;

use crate::directory::PeerDirectory;

/// Reads events from line-delimited JSON and teaches the directory sender names.
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    lines: Split<R>,
    line: usize,
    directory: Arc<PeerDirectory>,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Source over `reader`.
    pub fn new(reader: R, directory: Arc<PeerDirectory>) -> Self {
        Self {
            lines: reader.split(b'\n'),
            line: 0,
            directory,
        }
    }

    /// Lines consumed so far, blank ones included.
    #[must_use]
    pub fn lines_read(&self) -> usize {
        self.line
    }
}

impl JsonLinesSource<BufReader<File>> {
    /// Source over the file at `path`.
    pub async fn open(
        path: impl AsRef<Path>,
        directory: Arc<PeerDirectory>,
    ) -> std::io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self::new(BufReader::new(file), directory))
    }
}

impl JsonLinesSource<BufReader<Stdin>> {
    /// Source over the process's standard input.
    #[must_use]
    pub fn stdin(directory: Arc<PeerDirectory>) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), directory)
    }
}

#[async_trait]
impl<R> MessageSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_event(&mut self) -> Result<Option<InboundEvent>, SourceError> {
        while let Some(raw) = self.lines.next_segment().await? {
            self.line += 1;
            let text = std::str::from_utf8(&raw).map_err(|e| SourceError::Decode {
                line: self.line,
                reason: e.to_string(),
            })?;
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }

            let event: InboundEvent =
                serde_json::from_str(trimmed).map_err(|e| SourceError::Decode {
                    line: self.line,
                    reason: e.to_string(),
                })?;

            self.directory
                .remember(&event.sender_id, &event.sender_name);
            trace!(line = self.line, sender = %event.sender_id, "Decoded inbound event");
            return Ok(Some(event));
        }
        Ok(None)
    }
}
