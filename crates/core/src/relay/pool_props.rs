//! Property-based tests for pool admission.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::fakes::{RecordingNotifier, RecordingStore, StagedFetcher};
use super::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

/// Workers alive at once, from admission until `process` returns.
#[derive(Default)]
struct Occupancy {
    active: AtomicUsize,
    peak: AtomicUsize,
    finished: AtomicUsize,
}

struct Occupied(Arc<Occupancy>);

impl Occupancy {
    fn enter(self: &Arc<Self>) -> Occupied {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Occupied(Arc::clone(self))
    }
}

impl Drop for Occupied {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        self.0.finished.fetch_add(1, Ordering::SeqCst);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Property: more media jobs than slots never run more than N whole workers
    // (fetch, upload, cleanup, confirmation) at once.
    #[test]
    fn prop_peak_workers_bounded_by_pool_size(
        pool_size in 1usize..5,
        extra in 1usize..8,
    ) {
        let dir = TempDir::new().unwrap();
        let jobs = pool_size + extra;
        let fetcher = Arc::new(
            StagedFetcher::new(dir.path(), 64).slow(Duration::from_millis(15)),
        );
        let store = Arc::new(RecordingStore::new().reading_bodies());
        let occupancy = Arc::new(Occupancy::default());

        runtime().block_on(async {
            let cancel = CancellationToken::new();
            let worker = Arc::new(RelayWorker::new(
                fetcher.clone(),
                store.clone(),
                Arc::new(RecordingNotifier::new()),
                WorkerSettings {
                    auto_remove: true,
                    send_confirmation: true,
                    transfer_timeout: None,
                },
                cancel.clone(),
            ));
            let pool = RelayPool::new(ConcurrencyLimiter::new(pool_size), cancel);

            for i in 0..jobs {
                let job = RelayJob {
                    sender: "dave".to_owned(),
                    media: MediaRef::new("remote://item")
                        .with_kind(MediaKind::Document)
                        .with_file_name(format!("item_{i}.bin")),
                };
                let worker = Arc::clone(&worker);
                let occupancy = Arc::clone(&occupancy);
                pool.submit(async move {
                    let _occupied = occupancy.enter();
                    let _ = worker.process(&job).await;
                })
                .await
                .unwrap();
            }
            pool.shutdown(Duration::from_secs(10)).await;
        });

        let peak = occupancy.peak.load(Ordering::SeqCst);
        prop_assert!(peak <= pool_size, "peak {} > pool size {}", peak, pool_size);
        prop_assert!(peak >= 1);
        prop_assert_eq!(occupancy.finished.load(Ordering::SeqCst), jobs);
        prop_assert_eq!(fetcher.calls(), jobs);
        prop_assert_eq!(store.calls().len(), jobs);
    }
}
