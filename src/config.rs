//! Configuration types for nvd-search
//!
//! A [`Config`] is built once at startup (defaults, or a JSON file) and passed
//! into the [`Synchronizer`](crate::Synchronizer). Nothing reads feed
//! locations from process-wide state.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{Error, Result};

/// Feed location and format
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the feed tree (default: "https://static.nvd.nist.gov/feeds/")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Feed format version, one decimal place (default: "1.0")
    #[serde(default = "default_feed_version")]
    pub version: String,

    /// What the published `sha256` covers (default: compressed bytes)
    #[serde(default)]
    pub digest_scope: DigestScope,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            version: default_feed_version(),
            digest_scope: DigestScope::default(),
        }
    }
}

/// Which bytes a published digest is computed over
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestScope {
    /// The `.json.gz` file as downloaded
    #[default]
    Compressed,
    /// The gunzipped JSON document (what the live NVD 1.1 `.meta` files publish)
    Uncompressed,
}

/// Local store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store directory (default: "~/.config/nvd-cli/db", expanded by the CLI)
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// HTTP fetch behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Upper bound for one request, including the body (default: 300 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Upper bound for establishing a connection (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum in-flight requests within one phase (default: 8)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for transient transport failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
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

/// Disk space pre-flight before artifacts are downloaded
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Free space to keep in reserve (default: 64 MB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,

    /// Multiplier for the published artifact sizes (default: 1.5)
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: default_min_free_space(),
            size_multiplier: default_size_multiplier(),
        }
    }
}

/// Main configuration for the [`Synchronizer`](crate::Synchronizer)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Feed location and format
    #[serde(default)]
    pub feed: FeedConfig,

    /// Local store location
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP timeouts and concurrency
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Backoff for transient transport failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Disk space pre-flight
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,
}

impl Config {
    /// Configuration with defaults and the given store directory
    pub fn with_store(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.store.path = path.into();
        config
    }

    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.feed.base_url).map_err(|e| {
            Error::config(
                format!("invalid base URL {:?}: {}", self.feed.base_url, e),
                "feed.base_url",
            )
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::config(
                format!("base URL must be http or https, got {}", base.scheme()),
                "feed.base_url",
            ));
        }

        if !feed_version_pattern().is_match(&self.feed.version) {
            return Err(Error::config(
                format!(
                    "feed version {:?} must have exactly one decimal place (e.g. \"1.0\")",
                    self.feed.version
                ),
                "feed.version",
            ));
        }

        if self.fetch.max_concurrent_fetches == 0 {
            return Err(Error::config(
                "max_concurrent_fetches must be at least 1",
                "fetch.max_concurrent_fetches",
            ));
        }

        if self.fetch.request_timeout.is_zero() {
            return Err(Error::config(
                "request_timeout must be greater than zero",
                "fetch.request_timeout",
            ));
        }

        if !(self.retry.backoff_multiplier >= 1.0) {
            return Err(Error::config(
                "backoff_multiplier must be at least 1.0",
                "retry.backoff_multiplier",
            ));
        }

        if !(self.disk_space.size_multiplier >= 0.0) {
            return Err(Error::config(
                "size_multiplier must not be negative",
                "disk_space.size_multiplier",
            ));
        }

        Ok(())
    }
}

fn feed_version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.\d$").expect("feed version pattern is valid"))
}

// Default value functions
fn default_base_url() -> String {
    "https://static.nvd.nist.gov/feeds/".to_string()
}

fn default_feed_version() -> String {
    "1.0".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("~/.config/nvd-cli/db")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_user_agent() -> String {
    format!("nvd-search/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_min_free_space() -> u64 {
    64 * 1024 * 1024 // 64 MB
}

fn default_size_multiplier() -> f64 {
    1.5
}

// Duration serialization helper (whole seconds)
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
