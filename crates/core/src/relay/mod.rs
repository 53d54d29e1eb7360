//! Media relay pipeline.
//!
//! Inbound events are resolved to a sender name, filtered against the
//! target allow-list, and events carrying media are handed to a relay
//! worker through a fixed-capacity pool.
//!
//! # Modules
//!
//! - `types` - Events, media references, reports
//! - `error` - Per-stage error types
//! - `ports` - Traits for the message source, fetcher, resolver, store and notifier
//! - `limiter` - Owned semaphore handing out pool slots
//! - `pool` - Bounded task pool with graceful drain
//! - `worker` - Fetch, upload, cleanup and confirmation for one item
//! - `dispatch` - Per-event routing and the feed loop

pub mod dispatch;
pub mod error;
pub mod limiter;
pub mod pool;
pub mod ports;
pub mod types;
pub mod worker;

#[cfg(test)]
mod fakes;
#[cfg(test)]
mod pool_props;
#[cfg(test)]
mod tests;

/// Tracing target for the operator-facing activity lines
/// (`Message from ...`, `File uploaded to ...`).
pub const ACTIVITY_TARGET: &str = "mediarelay::activity";

pub use dispatch::{Dispatch, Dispatcher, RelayOutcome, RunEnd, TargetAllowList};
pub use error::{
    DispatchError, FetchError, NotifyError, RelayError, ResolveError, SourceError, Stage,
};
pub use limiter::{ConcurrencyLimiter, LimiterClosed, PoolSlot};
pub use pool::{Drain, RelayPool};
pub use ports::{MediaFetcher, MediaStore, MessageSource, PeerResolver, SelfNotifier, UploadBody};
pub use types::{
    Confirmation, DownloadedMedia, InboundEvent, MediaKind, MediaRef, RelayJob, RelayReport,
    Removal, SenderId, object_key,
};
pub use worker::{RelayWorker, WorkerSettings};
