//! Relay worker: one media item from fetch to confirmation.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use mediarelay_shared::DispatchConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ACTIVITY_TARGET;
use super::error::{RelayError, Stage};
use super::ports::{MediaFetcher, MediaStore, SelfNotifier};
use super::types::{Confirmation, MediaRef, RelayJob, RelayReport, Removal, object_key};

/// Post-upload behaviour and transfer limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerSettings {
    /// Delete the local file after a successful upload.
    pub auto_remove: bool,
    /// Send the retrieval URL back to self.
    pub send_confirmation: bool,
    /// Limit applied separately to fetch and upload. `None` is unbounded.
    pub transfer_timeout: Option<Duration>,
}

impl WorkerSettings {
    /// Settings from the `dispatch` configuration section.
    #[must_use]
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            auto_remove: config.auto_remove_media,
            send_confirmation: config.send_info_uploaded,
            transfer_timeout: (config.transfer_timeout_secs > 0)
                .then(|| Duration::from_secs(config.transfer_timeout_secs)),
        }
    }
}

/// Executes relay jobs against the fetcher, store and notifier.
#[derive(Clone)]
pub struct RelayWorker {
    fetcher: Arc<dyn MediaFetcher>,
    store: Arc<dyn MediaStore>,
    notifier: Arc<dyn SelfNotifier>,
    settings: WorkerSettings,
    cancel: CancellationToken,
}

impl RelayWorker {
    /// Worker that stops in-flight transfers when `cancel` fires.
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        store: Arc<dyn MediaStore>,
        notifier: Arc<dyn SelfNotifier>,
        settings: WorkerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            store,
            notifier,
            settings,
            cancel,
        }
    }

    /// Run a job, logging its failure. Never fails the process.
    pub async fn process(&self, job: &RelayJob) -> Result<RelayReport, RelayError> {
        let outcome = self.run(&job.sender, &job.media).await;
        if let Err(err) = &outcome {
            info!(
                target: ACTIVITY_TARGET,
                "Error processing media from {}: {err}", job.sender
            );
        }
        outcome
    }

    /// Fetch, upload and post-process one media item.
    ///
    /// Removal and confirmation failures are recorded in the report; only
    /// the fetch and upload stages can fail the item.
    pub async fn run(&self, sender: &str, media: &MediaRef) -> Result<RelayReport, RelayError> {
        info!(target: ACTIVITY_TARGET, "Message contains media from {sender}");

        let mut downloaded = self
            .bounded(Stage::Download, self.fetcher.fetch(media, sender))
            .await?
            .map_err(RelayError::Download)?;

        let meta = tokio::fs::metadata(&downloaded.path)
            .await
            .map_err(RelayError::Stat)?;
        downloaded.size = meta.len();
        let file_name = downloaded
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| {
                RelayError::Stat(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", downloaded.path.display()),
                ))
            })?;

        let file = tokio::fs::File::open(&downloaded.path)
            .await
            .map_err(RelayError::Open)?;

        let key = object_key(sender, downloaded.kind, &file_name);
        let content_type = downloaded.kind.content_type(&file_name);
        debug!(%key, size = downloaded.size, content_type, "Uploading media");

        let upload = self
            .bounded(
                Stage::Upload,
                self.store
                    .store(&key, Box::new(file), downloaded.size, content_type),
            )
            .await?
            .map_err(RelayError::Upload)?;

        info!(target: ACTIVITY_TARGET, "File uploaded to {}", upload.url);

        let removal = self.remove_local(&downloaded.path).await;
        let confirmation = self.confirm(&upload.url).await;

        info!(
            target: ACTIVITY_TARGET,
            "File {file_name} uploaded to {}", upload.url
        );

        Ok(RelayReport {
            sender: sender.to_owned(),
            media: downloaded,
            upload,
            removal,
            confirmation,
        })
    }

    async fn remove_local(&self, path: &std::path::Path) -> Removal {
        if !self.settings.auto_remove {
            return Removal::Kept;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed local media");
                Removal::Removed
            }
            Err(err) => {
                let err = RelayError::Remove(err);
                warn!(path = %path.display(), error = %err, "Keeping local media");
                Removal::Failed(err.to_string())
            }
        }
    }

    async fn confirm(&self, url: &str) -> Confirmation {
        if !self.settings.send_confirmation {
            return Confirmation::Disabled;
        }
        match self.notifier.notify_self(&format!("File uploaded to {url}")).await {
            Ok(()) => Confirmation::Sent,
            Err(err) => {
                warn!(error = %err, "Upload confirmation was not delivered");
                Confirmation::Failed(err.to_string())
            }
        }
    }

    async fn bounded<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = T>,
    ) -> Result<T, RelayError> {
        let limited = async {
            match self.settings.transfer_timeout {
                Some(after) => tokio::time::timeout(after, fut)
                    .await
                    .map_err(|_| RelayError::TimedOut { stage, after }),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(RelayError::Cancelled { stage }),
            out = limited => out,
        }
    }
}

impl std::fmt::Debug for RelayWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayWorker")
            .field("settings", &self.settings)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
