//! Replies to self, written as JSON lines.

use async_trait::async_trait;
use mediarelay_core::relay::{NotifyError, SelfNotifier};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
struct Reply<'a> {
    to: &'static str,
    text: &'a str,
}

/// Writes `{"to":"self","text":...}` lines to a writer.
#[derive(Debug)]
pub struct JsonLinesOutbox<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesOutbox<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Outbox over `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesOutbox<Stdout> {
    /// Outbox on the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> SelfNotifier for JsonLinesOutbox<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn notify_self(&self, text: &str) -> Result<(), NotifyError> {
        let mut line = serde_json::to_vec(&Reply { to: "self", text })
            .map_err(|e| NotifyError(e.to_string()))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        writer.flush().await.map_err(|e| NotifyError(e.to_string()))
    }
}
