//! Configuration types for media-dl

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Download behavior configuration (directories, concurrency, verification)
///
/// Groups settings related to how jobs are admitted, fetched, and verified.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Artifact root directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum jobs in a non-terminal state at once (default: 4)
    ///
    /// This is the admission ceiling: a `start_job` call that would push the
    /// active-job count past this limit is rejected with CapacityExceeded.
    #[serde(default = "default_max_active_jobs")]
    pub max_active_jobs: usize,

    /// Concurrent executors for extraction work (default: host cores - 1, min 1)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Timeout for the upstream metadata lookup (default: 15 seconds)
    ///
    /// Elapsing this fails the whole job with UpstreamTimeout, not just the
    /// metadata step.
    #[serde(default = "default_metadata_timeout", with = "duration_serde")]
    pub metadata_timeout: Duration,

    /// Attempts for the post-extraction artifact readability check (default: 5)
    ///
    /// The producing process and the verifying read may race on slow
    /// filesystems, so verification retries with a bounded delay.
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,

    /// Delay between artifact readability checks (default: 200ms)
    #[serde(default = "default_verify_delay_ms")]
    pub verify_delay_ms: u64,

    /// Maximum declared size accepted for the direct-URL short-circuit
    /// (default: 4 GiB)
    ///
    /// A resolved format whose direct location declares a larger size, or no
    /// size at all (and none can be probed), falls through to local extraction.
    #[serde(default = "default_direct_max_bytes")]
    pub direct_max_bytes: u64,

    /// Timeout for the direct-URL HEAD probe (default: 5 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// Accept plain-http direct locations (default: false)
    ///
    /// The direct-URL short-circuit normally requires secure transport.
    /// Enable only for private networks or test environments.
    #[serde(default)]
    pub allow_insecure_direct: bool,

    /// Maximum resolution height offered to clients (default: 1080)
    #[serde(default = "default_max_resolution")]
    pub max_resolution: u32,

    /// Quality buckets formats are grouped into (default: [360, 720, 1080])
    #[serde(default = "default_supported_qualities")]
    pub supported_qualities: Vec<u32>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_active_jobs: default_max_active_jobs(),
            max_workers: default_max_workers(),
            metadata_timeout: default_metadata_timeout(),
            verify_attempts: default_verify_attempts(),
            verify_delay_ms: default_verify_delay_ms(),
            direct_max_bytes: default_direct_max_bytes(),
            probe_timeout: default_probe_timeout(),
            allow_insecure_direct: false,
            max_resolution: default_max_resolution(),
            supported_qualities: default_supported_qualities(),
        }
    }
}

/// Metadata cache configuration
///
/// Bounds the memory held by cached upstream lookups and controls how stale
/// entries are reclaimed.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheConfig {
    /// Maximum number of cached entries (default: 256)
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Default time-to-live for entries inserted without one (default: 5 minutes)
    #[serde(default = "default_cache_ttl", with = "duration_serde")]
    pub default_ttl: Duration,

    /// Interval between background sweeps of expired entries (default: 5 minutes)
    #[serde(default = "default_cache_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            default_ttl: default_cache_ttl(),
            sweep_interval: default_cache_sweep_interval(),
        }
    }
}

/// Retention sweeper configuration
///
/// Controls reclamation of disk space held by finished jobs.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetentionConfig {
    /// Enable the background retention sweeper (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Age past which a finished job's artifact is deleted (default: 5 minutes)
    #[serde(default = "default_retention_max_age", with = "duration_serde")]
    pub max_age: Duration,

    /// Interval between sweeper passes (default: 60 seconds)
    #[serde(default = "default_retention_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age: default_retention_max_age(),
            sweep_interval: default_retention_sweep_interval(),
        }
    }
}

/// External tool paths (extractor, ffmpeg)
///
/// Groups settings for the external media-extraction binaries.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolsConfig {
    /// Path to the extractor executable (auto-detected if None)
    #[serde(default)]
    pub extractor_path: Option<PathBuf>,

    /// Path to the ffmpeg executable used for tag editing (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for binaries if explicit paths are not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Extra command-line arguments passed to every extractor invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            extractor_path: None,
            ffmpeg_path: None,
            search_path: true,
            extra_args: Vec::new(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 500ms)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8750)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for MediaDownloader
///
/// Fields are organized into logical sub-configs for maintainability:
/// - [`download`](DownloadConfig) — directories, admission ceiling, verification
/// - [`cache`](CacheConfig) — metadata cache bounds and sweep cadence
/// - [`retention`](RetentionConfig) — artifact reclamation
/// - [`tools`](ToolsConfig) — external binary paths
/// - [`retry`](RetryConfig) — backoff for transient failures
/// - [`api`](ApiConfig) — REST API server
///
/// The `download` and `tools` sub-configs are flattened for a compact
/// serialized format; `cache` and `retention` stay nested because their
/// sweep-interval keys would collide if flattened.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Metadata cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retention sweeper settings
    #[serde(default)]
    pub retention: RetentionConfig,

    /// External tool paths
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Retry behavior for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// REST API server settings
    #[serde(default)]
    pub api: ApiConfig,
}

// Convenience accessors — allow call sites to use `config.download_dir()` etc.
// without reaching through the sub-config structs.
impl Config {
    /// Artifact root directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Admission ceiling for concurrently active jobs
    pub fn max_active_jobs(&self) -> usize {
        self.download.max_active_jobs
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_active_jobs() -> usize {
    4
}

fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

fn default_metadata_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_verify_attempts() -> u32 {
    5
}

fn default_verify_delay_ms() -> u64 {
    200
}

fn default_direct_max_bytes() -> u64 {
    4 * 1024 * 1024 * 1024
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_resolution() -> u32 {
    1080
}

fn default_supported_qualities() -> Vec<u32> {
    vec![360, 720, 1080]
}

fn default_cache_max_entries() -> usize {
    256
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_cache_sweep_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_retention_max_age() -> Duration {
    Duration::from_secs(300)
}

fn default_retention_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    "127.0.0.1:8750"
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8750)))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper - serializes as integer seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
