//! Application configuration management.

use std::path::PathBuf;

use serde::Deserialize;

/// Environment variable prefix for layered configuration.
pub const ENV_PREFIX: &str = "MEDIARELAY";

/// Pool size used when `dispatch.worker_pool` is absent, unparsable or non-positive.
pub const DEFAULT_WORKER_POOL: usize = 5;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Dispatch and relay behaviour.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Object storage connection.
    #[serde(default)]
    pub storage: ObjectStoreConfig,
    /// Local media staging.
    #[serde(default)]
    pub media: MediaConfig,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

/// Pool size as written by the operator.
///
/// Accepts both numbers and strings so that a bad value degrades to the
/// default instead of failing the whole configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PoolSizeSetting {
    /// Numeric value.
    Number(i64),
    /// Raw text, parsed leniently.
    Text(String),
}

impl PoolSizeSetting {
    /// Resolved pool size, or `None` when the value is invalid or non-positive.
    #[must_use]
    pub fn resolve(&self) -> Option<usize> {
        let raw = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<i64>().ok()?,
        };
        usize::try_from(raw).ok().filter(|n| *n > 0)
    }
}

/// Dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Sender display names to relay media from. Empty admits everyone.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Maximum number of concurrent relay workers.
    #[serde(default)]
    pub worker_pool: Option<PoolSizeSetting>,
    /// Delete the local copy once uploaded.
    #[serde(default)]
    pub auto_remove_media: bool,
    /// Send the retrieval URL back to self after upload.
    #[serde(default)]
    pub send_info_uploaded: bool,
    /// Per-transfer timeout in seconds for fetch and upload. `0` disables it.
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,
    /// Seconds to wait for in-flight workers on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_transfer_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            worker_pool: None,
            auto_remove_media: false,
            send_info_uploaded: false,
            transfer_timeout_secs: default_transfer_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl DispatchConfig {
    /// Effective pool size, falling back to [`DEFAULT_WORKER_POOL`].
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.worker_pool
            .as_ref()
            .and_then(PoolSizeSetting::resolve)
            .unwrap_or(DEFAULT_WORKER_POOL)
    }

    /// Allow-list entries with surrounding whitespace and blanks removed.
    #[must_use]
    pub fn target_names(&self) -> Vec<String> {
        self.targets
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }
}

/// S3-compatible object store connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectStoreConfig {
    /// Host name of the object store.
    #[serde(default)]
    pub host: String,
    /// Optional port appended to the host.
    #[serde(default)]
    pub port: Option<u16>,
    /// Full endpoint URL, overrides host and port when set.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Access key.
    #[serde(default)]
    pub access_key: String,
    /// Secret key.
    #[serde(default)]
    pub secret_key: String,
    /// Bucket name.
    #[serde(default)]
    pub bucket: String,
    /// Use TLS when building the endpoint from host and port.
    #[serde(default)]
    pub ssl: bool,
    /// Bucket region.
    #[serde(default)]
    pub region: Option<String>,
}

/// Local media staging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Directory downloaded media is written to.
    #[serde(default = "default_media_dir")]
    pub dir: PathBuf,
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("session/media")
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: default_media_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Enable debug-level logging for the relay crates.
    #[serde(default)]
    pub debug: bool,
    /// Emit JSON log lines on stderr.
    #[serde(default)]
    pub json: bool,
    /// Explicit `EnvFilter` directive, overrides `debug`.
    #[serde(default)]
    pub filter: Option<String>,
    /// Directory of the rotating JSON log file.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    /// Daily log files kept before the oldest is deleted.
    #[serde(default = "default_log_max_files")]
    pub max_files: usize,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("session")
}

const fn default_log_max_files() -> usize {
    7
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            json: false,
            filter: None,
            dir: default_log_dir(),
            max_files: default_log_max_files(),
        }
    }
}

impl LogConfig {
    /// Filter directive for the tracing subscriber.
    #[must_use]
    pub fn directive(&self) -> String {
        match &self.filter {
            Some(filter) => filter.clone(),
            None if self.debug => "mediarelay=debug,relayctl=debug".to_string(),
            None => "mediarelay=info,relayctl=info".to_string(),
        }
    }
}

/// Flat variable names understood for compatibility with older deployments.
const LEGACY_VARS: &[(&str, &str)] = &[
    ("USER_TARGET", "dispatch.targets"),
    ("WORKER_POOL", "dispatch.worker_pool"),
    ("AUTO_REMOVE_MEDIA", "dispatch.auto_remove_media"),
    ("SEND_INFO_UPLOADED", "dispatch.send_info_uploaded"),
    ("MINIO_HOST", "storage.host"),
    ("MINIO_PORT", "storage.port"),
    ("MINIO_ENDPOINT", "storage.endpoint"),
    ("MINIO_ACCESS_KEY", "storage.access_key"),
    ("MINIO_SECRET_KEY", "storage.secret_key"),
    ("MINIO_BUCKET", "storage.bucket"),
    ("MINIO_SSL", "storage.ssl"),
    ("MINIO_REGION", "storage.region"),
    ("DEBUG", "log.debug"),
];

impl AppConfig {
    /// Loads configuration from config files, the environment and legacy variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("dispatch.targets"),
            );

        for (var, key) in LEGACY_VARS {
            let value = std::env::var(var).ok().filter(|v| !v.is_empty());
            builder = match (*key, value) {
                ("dispatch.targets", Some(v)) => builder.set_override(
                    *key,
                    v.split(',').map(|s| s.trim().to_string()).collect::<Vec<_>>(),
                )?,
                (_, value) => builder.set_override_option(*key, value)?,
            };
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
