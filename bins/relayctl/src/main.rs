//! relayctl
//!
//! Inspect and manage relayed objects using the same configuration as the
//! daemon.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mediarelay_core::storage::{StorageConfig, StorageProvider, StorageService};
use mediarelay_shared::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "relayctl")]
#[command(about = "Inspect and manage relayed media in the bucket", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List stored objects, recursively
    List {
        /// Key prefix, e.g. `alice/photo/`; everything when omitted
        prefix: Option<String>,
    },

    /// Show size, content type and entity tag of an object
    Stat {
        /// Object key
        key: String,
    },

    /// Mint a presigned download URL
    Url {
        /// Object key
        key: String,

        /// Validity in seconds (default: 7 days)
        #[arg(long, value_name = "SECS")]
        ttl: Option<u64>,
    },

    /// Download an object
    Get {
        /// Object key
        key: String,

        /// Output file; stdout when omitted
        #[arg(value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Delete an object
    Rm {
        /// Object key
        key: String,
    },

    /// Print a collision-resistant object name for a file name
    Name {
        /// Original file name
        file_name: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relayctl=warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("relayctl: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn client() -> anyhow::Result<StorageService> {
    let config = AppConfig::load().context("load configuration")?;
    let provider = StorageProvider::from_settings(&config.storage)?;
    let service = StorageService::from_config(StorageConfig::new(provider))?;
    debug!(
        provider = service.provider_name(),
        bucket = service.bucket(),
        "Object store client ready"
    );
    Ok(service)
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Name { file_name } => {
            println!("{}", StorageService::generate_object_name(&file_name));
        }
        Command::List { prefix } => {
            for object in client()?.list(prefix.as_deref().unwrap_or_default()).await? {
                println!(
                    "{}\t{}\t{}",
                    object.key,
                    object.size,
                    object.content_type.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Stat { key } => {
            let info = client()?.stat(&key).await?;
            println!("key:          {}", info.key);
            println!("size:         {}", info.size);
            println!(
                "content-type: {}",
                info.content_type.as_deref().unwrap_or("-")
            );
            println!("etag:         {}", info.etag.as_deref().unwrap_or("-"));
        }
        Command::Url { key, ttl } => {
            let service = client()?;
            let ttl = Duration::from_secs(ttl.unwrap_or(service.config().retrieval_ttl_secs));
            let presigned = service.presign_download(&key, ttl).await?;
            println!("{}", presigned.url);
            debug!(expires_at = %presigned.expires_at, method = %presigned.method, "Presigned");
        }
        Command::Get { key, out } => {
            let service = client()?;
            let written = match out {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("create {}", path.display()))?;
                    copy_object(&service, &key, &mut file).await?
                }
                None => copy_object(&service, &key, &mut tokio::io::stdout()).await?,
            };
            debug!(key = %key, bytes = written, "Downloaded object");
        }
        Command::Rm { key } => {
            client()?.delete(&key).await?;
            eprintln!("removed {key}");
        }
    }

    Ok(())
}

async fn copy_object<W>(service: &StorageService, key: &str, out: &mut W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let stream = service.get(key).await?;
    let mut stream = std::pin::pin!(stream);
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}
