//! mediarelay daemon
//!
//! Reads inbound events as JSON lines (stdin, or the file named by
//! `MEDIARELAY_FEED`) and relays their media to the configured bucket.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mediarelay_core::relay::{
    ACTIVITY_TARGET, ConcurrencyLimiter, Dispatcher, MessageSource, RelayPool, RelayWorker,
    RunEnd, TargetAllowList, WorkerSettings,
};
use mediarelay_core::storage::{StorageConfig, StorageProvider, StorageService};
use mediarelay_feed::{JsonLinesOutbox, JsonLinesSource, LocalMediaFetcher, PeerDirectory};
use mediarelay_shared::{AppConfig, AppError, LogConfig};

/// Path of the inbound feed; unset or `-` reads stdin.
const FEED_VAR: &str = "MEDIARELAY_FEED";

/// Prefix of the daily log files inside `log.dir`.
const LOG_FILE: &str = "mediarelay.log";

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Application error: {}", AppError::from(err));
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_tracing(&config.log) {
        eprintln!("Application error: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => {
            info!(target: ACTIVITY_TARGET, "Application stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let kind = err
                .downcast_ref::<AppError>()
                .map_or("INTERNAL_ERROR", AppError::error_code);
            error!(code = kind, "{err:#}");
            info!(target: ACTIVITY_TARGET, "Application error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn base_filter(log: &LogConfig) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(log.directive())
            .with_context(|| format!("invalid log filter `{}`", log.directive())),
    }
}

/// Diagnostics go to stderr under the configured filter; operator-facing
/// activity lines go to stdout as bare messages. Everything, activity
/// included, is also written as JSON to a daily-rotated file in `log.dir`.
fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = base_filter(log)?.add_directive(format!("{ACTIVITY_TARGET}=off").parse()?);

    let diagnostics = if log.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    };

    let activity = fmt::layer()
        .with_writer(std::io::stdout)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_filter(Targets::new().with_target(ACTIVITY_TARGET, LevelFilter::INFO));

    std::fs::create_dir_all(&log.dir).map_err(|e| {
        AppError::Session(format!(
            "failed to create log directory {}: {e}",
            log.dir.display()
        ))
    })?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE)
        .max_log_files(log.max_files.max(1))
        .build(&log.dir)
        .with_context(|| format!("open log file in {}", log.dir.display()))?;
    let file = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(appender)
        .with_filter(base_filter(log)?.add_directive(format!("{ACTIVITY_TARGET}=info").parse()?));

    tracing_subscriber::registry()
        .with(diagnostics)
        .with(activity)
        .with(file)
        .try_init()
        .context("install tracing subscriber")
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let provider = StorageProvider::from_settings(&config.storage)
        .map_err(|e| AppError::Configuration(e.to_string()))?;
    let storage = StorageService::connect(StorageConfig::new(provider))
        .await
        .map_err(|e| AppError::Storage(format!("failed to initialize object store: {e}")))?;
    info!(
        provider = storage.provider_name(),
        bucket = storage.bucket(),
        "Connected to object store"
    );

    let fetcher = LocalMediaFetcher::new(&config.media.dir);
    fetcher.ensure_media_dir().await.map_err(|e| {
        AppError::Session(format!(
            "failed to create media directory {}: {e}",
            config.media.dir.display()
        ))
    })?;

    let cancel = CancellationToken::new();
    let settings = WorkerSettings::from_config(&config.dispatch);
    let worker = RelayWorker::new(
        Arc::new(fetcher),
        Arc::new(storage),
        Arc::new(JsonLinesOutbox::stdout()),
        settings,
        cancel.clone(),
    );

    let directory = Arc::new(PeerDirectory::new());
    let targets = TargetAllowList::from_config(&config.dispatch);
    let pool = RelayPool::new(
        ConcurrencyLimiter::new(config.dispatch.pool_size()),
        cancel.clone(),
    );
    info!(
        workers = pool.capacity(),
        targets = ?targets.names(),
        auto_remove = settings.auto_remove,
        send_confirmation = settings.send_confirmation,
        transfer_timeout_secs = config.dispatch.transfer_timeout_secs,
        "Relay configured"
    );
    let dispatcher = Dispatcher::new(directory.clone(), targets, pool, worker);

    let mut source = open_feed(directory).await?;

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            interrupt.cancel();
        }
    });

    info!(target: ACTIVITY_TARGET, "Listening for events. Interrupt (Ctrl+C) to stop.");
    let end = dispatcher.run(source.as_mut(), &cancel).await;

    let grace = Duration::from_secs(config.dispatch.shutdown_grace_secs);
    dispatcher.shutdown(grace).await;

    match end.map_err(|e| AppError::Feed(e.to_string()))? {
        RunEnd::Exhausted => info!("Inbound feed finished"),
        RunEnd::Cancelled => info!("Relay interrupted"),
    }
    Ok(())
}

async fn open_feed(directory: Arc<PeerDirectory>) -> Result<Box<dyn MessageSource>, AppError> {
    match std::env::var(FEED_VAR) {
        Ok(path) if !path.is_empty() && path != "-" => {
            let source = JsonLinesSource::open(&path, directory)
                .await
                .map_err(|e| AppError::Feed(format!("failed to open {path}: {e}")))?;
            info!(path = %path, "Reading inbound feed from file");
            Ok(Box::new(source))
        }
        _ => {
            info!("Reading inbound feed from stdin");
            Ok(Box::new(JsonLinesSource::stdin(directory)))
        }
    }
}
