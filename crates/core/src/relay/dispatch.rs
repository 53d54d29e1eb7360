//! Per-event dispatch: resolve, filter, admit.

use std::sync::Arc;
use std::time::Duration;

use mediarelay_shared::DispatchConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ACTIVITY_TARGET;
use super::error::{DispatchError, RelayError, SourceError};
use super::pool::{Drain, RelayPool};
use super::ports::{MessageSource, PeerResolver};
use super::types::{InboundEvent, RelayJob, RelayReport};
use super::worker::RelayWorker;

/// Result of one relay job, as published on the report channel.
pub type RelayOutcome = Result<RelayReport, RelayError>;

/// Display names whose media is relayed. Empty admits everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetAllowList {
    names: Vec<String>,
}

impl TargetAllowList {
    /// Allow-list from raw names; blank entries are discarded.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && !list.iter().any(|n| n == name) {
                list.push(name.to_owned());
            }
        }
        Self { names: list }
    }

    /// Allow-list from the `dispatch` configuration section.
    #[must_use]
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.target_names())
    }

    /// Exact, case-sensitive membership. Everyone is admitted when empty.
    #[must_use]
    pub fn admits(&self, name: &str) -> bool {
        self.names.is_empty() || self.names.iter().any(|n| n == name)
    }

    /// `true` when no targets are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Configured names, in order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// What the dispatcher did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Sender is not a target; nothing happened.
    Filtered,
    /// Admitted without media; only the message line was emitted.
    TextOnly,
    /// A relay worker was launched.
    Launched,
}

/// Why the dispatch loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// The source has no more events.
    Exhausted,
    /// The cancellation token fired.
    Cancelled,
}

/// Routes inbound events to relay workers through a bounded pool.
pub struct Dispatcher {
    resolver: Arc<dyn PeerResolver>,
    targets: TargetAllowList,
    pool: RelayPool,
    worker: Arc<RelayWorker>,
    reports: Option<mpsc::UnboundedSender<RelayOutcome>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("targets", &self.targets)
            .field("pool", &self.pool)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher admitting media through `pool`.
    pub fn new(
        resolver: Arc<dyn PeerResolver>,
        targets: TargetAllowList,
        pool: RelayPool,
        worker: RelayWorker,
    ) -> Self {
        Self {
            resolver,
            targets,
            pool,
            worker: Arc::new(worker),
            reports: None,
        }
    }

    /// Publish every job's outcome on `reports`.
    #[must_use]
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<RelayOutcome>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Handle one event.
    ///
    /// Waits for a pool slot when the event carries media and all slots are
    /// busy.
    pub async fn dispatch(&self, event: InboundEvent) -> Result<Dispatch, DispatchError> {
        let name = self.resolver.resolve(&event.sender_id)?;

        if !self.targets.admits(&name) {
            return Ok(Dispatch::Filtered);
        }

        info!(target: ACTIVITY_TARGET, "Message from {name}: {}", event.text);

        let Some(media) = event.media else {
            return Ok(Dispatch::TextOnly);
        };

        let job = RelayJob { sender: name, media };
        let worker = Arc::clone(&self.worker);
        let reports = self.reports.clone();

        self.pool
            .submit(async move {
                let outcome = worker.process(&job).await;
                if let Some(reports) = reports {
                    // Receiver may be gone; the outcome was already logged.
                    let _ = reports.send(outcome);
                }
            })
            .await
            .map_err(|_| DispatchError::PoolClosed)?;

        Ok(Dispatch::Launched)
    }

    /// Dispatch events from `source` until it is exhausted or `cancel` fires.
    ///
    /// Per-event failures and undecodable records are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns the source's I/O error when reading fails.
    pub async fn run(
        &self,
        source: &mut dyn MessageSource,
        cancel: &CancellationToken,
    ) -> Result<RunEnd, SourceError> {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(RunEnd::Cancelled),
                next = source.next_event() => next,
            };

            let event = match next {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!("Inbound feed exhausted");
                    return Ok(RunEnd::Exhausted);
                }
                Err(err @ SourceError::Decode { .. }) => {
                    warn!(error = %err, "Skipping inbound event");
                    continue;
                }
                Err(err) => return Err(err),
            };

            let dispatched = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(RunEnd::Cancelled),
                dispatched = self.dispatch(event) => dispatched,
            };

            match dispatched {
                Ok(_) => {}
                Err(DispatchError::PoolClosed) => return Ok(RunEnd::Cancelled),
                Err(err) => warn!(error = %err, "Dropping inbound event"),
            }
        }
    }

    /// Stop admitting and drain in-flight workers for up to `grace`.
    pub async fn shutdown(&self, grace: Duration) -> Drain {
        self.pool.shutdown(grace).await
    }
}
