//! End-to-end tests for the relay pipeline with in-process collaborators.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::fakes::{ActivityLog, Directory, RecordingNotifier, RecordingStore, StagedFetcher};
use super::*;
use crate::storage::{MIB, UploadStrategy};

struct Rig {
    dispatcher: Dispatcher,
    fetcher: Arc<StagedFetcher>,
    store: Arc<RecordingStore>,
    notifier: Arc<RecordingNotifier>,
    reports: mpsc::UnboundedReceiver<RelayOutcome>,
}

impl Rig {
    fn new(
        targets: &[&str],
        pool_size: usize,
        settings: WorkerSettings,
        fetcher: StagedFetcher,
        store: RecordingStore,
        notifier: RecordingNotifier,
    ) -> Self {
        let fetcher = Arc::new(fetcher);
        let store = Arc::new(store);
        let notifier = Arc::new(notifier);
        let cancel = CancellationToken::new();

        let worker = RelayWorker::new(
            fetcher.clone(),
            store.clone(),
            notifier.clone(),
            settings,
            cancel.clone(),
        );
        let pool = RelayPool::new(ConcurrencyLimiter::new(pool_size), cancel);
        let resolver = Arc::new(Directory::new(&[
            ("1", "alice"),
            ("2", "bob"),
            ("3", "carol"),
        ]));
        let (tx, reports) = mpsc::unbounded_channel();
        let dispatcher =
            Dispatcher::new(resolver, TargetAllowList::new(targets), pool, worker).with_reports(tx);

        Self {
            dispatcher,
            fetcher,
            store,
            notifier,
            reports,
        }
    }

    async fn next_outcome(&mut self) -> RelayOutcome {
        tokio::time::timeout(Duration::from_secs(10), self.reports.recv())
            .await
            .expect("relay outcome in time")
            .expect("report channel open")
    }
}

fn photo_event(sender_id: &str, name: &str) -> InboundEvent {
    InboundEvent::text(sender_id, "", "look at this").with_media(
        MediaRef::new(format!("remote://{name}"))
            .with_kind(MediaKind::Photo)
            .with_file_name(name),
    )
}

fn settings(auto_remove: bool, send_confirmation: bool) -> WorkerSettings {
    WorkerSettings {
        auto_remove,
        send_confirmation,
        transfer_timeout: Some(Duration::from_secs(30)),
    }
}

#[tokio::test]
async fn test_scenario_a_target_photo_is_uploaded_and_removed() {
    let dir = TempDir::new().unwrap();
    let mut rig = Rig::new(
        &["alice"],
        5,
        settings(true, true),
        StagedFetcher::new(dir.path(), 10 * 1024),
        RecordingStore::new().reading_bodies(),
        RecordingNotifier::new(),
    );

    let dispatched = rig
        .dispatcher
        .dispatch(photo_event("1", "photo_20240101_120000.jpg"))
        .await
        .unwrap();
    assert_eq!(dispatched, Dispatch::Launched);

    let report = rig.next_outcome().await.unwrap();
    assert_eq!(report.sender, "alice");
    assert_eq!(report.upload.key, "alice/photo/photo_20240101_120000.jpg");
    assert_eq!(report.upload.strategy, UploadStrategy::SingleRequest);
    assert_eq!(report.upload.size, 10 * 1024);
    assert_eq!(report.media.size, 10 * 1024);
    assert_eq!(report.removal, Removal::Removed);
    assert_eq!(report.confirmation, Confirmation::Sent);
    assert!(!report.media.path.exists());

    let calls = rig.store.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].content_type, "image/jpeg");
    assert_eq!(calls[0].body.as_ref().map(Vec::len), Some(10 * 1024));

    assert_eq!(
        rig.notifier.sent(),
        vec![format!("File uploaded to {}", report.upload.url)]
    );
}

#[tokio::test]
async fn test_scenario_b_non_target_has_no_side_effects() {
    let dir = TempDir::new().unwrap();
    let rig = Rig::new(
        &["alice"],
        5,
        settings(true, true),
        StagedFetcher::new(dir.path(), 1024),
        RecordingStore::new(),
        RecordingNotifier::new(),
    );
    let (activity, _guard) = ActivityLog::capture();

    let dispatched = rig
        .dispatcher
        .dispatch(photo_event("2", "photo_1.jpg"))
        .await
        .unwrap();

    assert_eq!(dispatched, Dispatch::Filtered);
    rig.dispatcher.shutdown(Duration::from_secs(1)).await;
    assert_eq!(rig.fetcher.calls(), 0);
    assert!(rig.store.calls().is_empty());
    assert!(rig.notifier.sent().is_empty());
    assert!(activity.lines().is_empty(), "{:?}", activity.lines());
}

#[tokio::test]
async fn test_scenario_c_large_video_takes_chunked_path() {
    let dir = TempDir::new().unwrap();
    let mut rig = Rig::new(
        &[],
        5,
        settings(false, false),
        StagedFetcher::new(dir.path(), 200 * MIB),
        RecordingStore::new(),
        RecordingNotifier::new(),
    );

    let event = InboundEvent::text("3", "", "").with_media(
        MediaRef::new("remote://clip")
            .with_kind(MediaKind::Video)
            .with_file_name("clip.mp4"),
    );
    assert_eq!(
        rig.dispatcher.dispatch(event).await.unwrap(),
        Dispatch::Launched
    );

    let report = rig.next_outcome().await.unwrap();
    assert_eq!(report.upload.key, "carol/video/clip.mp4");
    assert_eq!(report.upload.strategy, UploadStrategy::Chunked);
    assert_eq!(report.upload.size, 200 * MIB);
    assert_eq!(report.removal, Removal::Kept);
    assert_eq!(report.confirmation, Confirmation::Disabled);
    assert!(report.media.path.exists());
    assert_eq!(rig.store.calls()[0].content_type, "video/mp4");
}

#[tokio::test]
async fn test_scenario_d_fetch_failure_releases_slot() {
    let dir = TempDir::new().unwrap();
    let mut rig = Rig::new(
        &[],
        1,
        settings(false, false),
        StagedFetcher::new(dir.path(), 1024).failing("network unreachable"),
        RecordingStore::new(),
        RecordingNotifier::new(),
    );
    let (activity, _guard) = ActivityLog::capture();

    for _ in 0..3 {
        let dispatched = tokio::time::timeout(
            Duration::from_secs(5),
            rig.dispatcher.dispatch(photo_event("1", "photo_1.jpg")),
        )
        .await
        .expect("slot released by failed worker")
        .unwrap();
        assert_eq!(dispatched, Dispatch::Launched);

        let outcome = rig.next_outcome().await;
        assert!(matches!(
            outcome,
            Err(RelayError::Download(FetchError::Transfer(_)))
        ));
    }

    assert_eq!(rig.fetcher.calls(), 3);
    assert!(rig.store.calls().is_empty());

    let failures: Vec<String> = activity
        .lines()
        .into_iter()
        .filter(|line| line.starts_with("Error processing media"))
        .collect();
    assert_eq!(
        failures,
        vec![
            "Error processing media from alice: download media: transfer failed: network unreachable";
            3
        ]
    );
}

#[tokio::test]
async fn test_text_only_event_is_not_relayed() {
    let dir = TempDir::new().unwrap();
    let rig = Rig::new(
        &["alice"],
        5,
        settings(false, false),
        StagedFetcher::new(dir.path(), 1024),
        RecordingStore::new(),
        RecordingNotifier::new(),
    );
    let (activity, _guard) = ActivityLog::capture();

    let dispatched = rig
        .dispatcher
        .dispatch(InboundEvent::text("1", "alice", "hello"))
        .await
        .unwrap();

    assert_eq!(dispatched, Dispatch::TextOnly);
    assert_eq!(rig.fetcher.calls(), 0);
    assert_eq!(activity.lines(), vec!["Message from alice: hello"]);
}

#[tokio::test]
async fn test_unknown_sender_is_a_dispatch_error() {
    let dir = TempDir::new().unwrap();
    let rig = Rig::new(
        &[],
        5,
        settings(false, false),
        StagedFetcher::new(dir.path(), 1024),
        RecordingStore::new(),
        RecordingNotifier::new(),
    );

    let err = rig
        .dispatcher
        .dispatch(photo_event("404", "photo_1.jpg"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::PeerResolution(ResolveError::PeerNotFound(_))
    ));
    assert_eq!(rig.fetcher.calls(), 0);
}

#[tokio::test]
async fn test_confirmation_failure_keeps_upload() {
    let dir = TempDir::new().unwrap();
    let mut rig = Rig::new(
        &[],
        5,
        settings(false, true),
        StagedFetcher::new(dir.path(), 2048),
        RecordingStore::new(),
        RecordingNotifier::failing(),
    );

    rig.dispatcher
        .dispatch(photo_event("1", "photo_2.jpg"))
        .await
        .unwrap();

    let report = rig.next_outcome().await.unwrap();
    assert!(matches!(report.confirmation, Confirmation::Failed(ref e) if e.contains("flood wait")));
    assert_eq!(rig.notifier.sent().len(), 1);
    assert_eq!(rig.store.calls().len(), 1);
}

#[tokio::test]
async fn test_removal_failure_keeps_upload() {
    let dir = TempDir::new().unwrap();
    let staged = dir.path().join("alice").join("photo").join("photo_3.jpg");
    let mut rig = Rig::new(
        &[],
        5,
        settings(true, false),
        StagedFetcher::new(dir.path(), 2048),
        RecordingStore::new().deleting(staged),
        RecordingNotifier::new(),
    );

    rig.dispatcher
        .dispatch(photo_event("1", "photo_3.jpg"))
        .await
        .unwrap();

    let report = rig.next_outcome().await.unwrap();
    assert!(matches!(report.removal, Removal::Failed(ref e) if e.starts_with("remove file")));
    assert_eq!(report.upload.key, "alice/photo/photo_3.jpg");
}

#[tokio::test]
async fn test_slow_fetch_times_out() {
    let dir = TempDir::new().unwrap();
    let worker = RelayWorker::new(
        Arc::new(StagedFetcher::new(dir.path(), 16).slow(Duration::from_secs(5))),
        Arc::new(RecordingStore::new()),
        Arc::new(RecordingNotifier::new()),
        WorkerSettings {
            transfer_timeout: Some(Duration::from_millis(50)),
            ..WorkerSettings::default()
        },
        CancellationToken::new(),
    );

    let err = worker
        .run("alice", &MediaRef::new("remote://x").with_kind(MediaKind::Photo))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RelayError::TimedOut {
            stage: Stage::Download,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancelled_fetch_stops() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let worker = RelayWorker::new(
        Arc::new(StagedFetcher::new(dir.path(), 16).slow(Duration::from_secs(5))),
        Arc::new(RecordingStore::new()),
        Arc::new(RecordingNotifier::new()),
        WorkerSettings::default(),
        cancel.clone(),
    );

    let media = MediaRef::new("remote://x");
    let run = worker.run("alice", &media);
    cancel.cancel();

    let err = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err,
        RelayError::Cancelled {
            stage: Stage::Download
        }
    ));
}

struct ScriptedSource(std::collections::VecDeque<Result<InboundEvent, SourceError>>);

#[async_trait::async_trait]
impl MessageSource for ScriptedSource {
    async fn next_event(&mut self) -> Result<Option<InboundEvent>, SourceError> {
        self.0.pop_front().transpose()
    }
}

#[tokio::test]
async fn test_run_skips_bad_records_and_drains() {
    let dir = TempDir::new().unwrap();
    let mut rig = Rig::new(
        &["alice", "carol"],
        2,
        settings(false, false),
        StagedFetcher::new(dir.path(), 512),
        RecordingStore::new(),
        RecordingNotifier::new(),
    );

    let mut source = ScriptedSource(
        vec![
            Ok(photo_event("1", "photo_a.jpg")),
            Err(SourceError::Decode {
                line: 2,
                reason: "expected value".into(),
            }),
            Ok(photo_event("404", "photo_b.jpg")),
            Ok(photo_event("2", "photo_c.jpg")),
            Ok(InboundEvent::text("3", "carol", "hi")),
            Ok(photo_event("3", "photo_d.jpg")),
        ]
        .into(),
    );

    let end = rig
        .dispatcher
        .run(&mut source, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(end, RunEnd::Exhausted);

    assert_eq!(
        rig.dispatcher.shutdown(Duration::from_secs(5)).await,
        Drain::Completed
    );

    let mut keys = Vec::new();
    while let Ok(outcome) = rig.reports.try_recv() {
        keys.push(outcome.unwrap().upload.key);
    }
    keys.sort();
    assert_eq!(keys, vec!["alice/photo/photo_a.jpg", "carol/photo/photo_d.jpg"]);
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    struct Silent;

    #[async_trait::async_trait]
    impl MessageSource for Silent {
        async fn next_event(&mut self) -> Result<Option<InboundEvent>, SourceError> {
            std::future::pending().await
        }
    }

    let dir = TempDir::new().unwrap();
    let rig = Rig::new(
        &[],
        1,
        settings(false, false),
        StagedFetcher::new(dir.path(), 1),
        RecordingStore::new(),
        RecordingNotifier::new(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let end = rig.dispatcher.run(&mut Silent, &cancel).await.unwrap();
    assert_eq!(end, RunEnd::Cancelled);
}
