//! Configuration types for publista-client

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for the publishing client
///
/// Sub-configs are nested (not flattened), so a JSON document mirrors the
/// struct layout: `{"api": {...}, "polling": {...}, ...}`. Every field has a
/// default, which makes `{}` a valid configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// API endpoint and request timeouts
    #[serde(default)]
    pub api: ApiConfig,

    /// Job and render status polling
    #[serde(default)]
    pub polling: PollingConfig,

    /// Backoff for transient request failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Client-side upload limits
    #[serde(default)]
    pub upload: UploadConfig,

    /// External binaries used for media metadata
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        let base = self.api.base_url.trim();
        if base.is_empty() {
            return Err(Error::Config {
                message: "base URL must not be empty".into(),
                key: Some("api.base_url".into()),
            });
        }
        let parsed = url::Url::parse(base).map_err(|e| Error::Config {
            message: format!("invalid base URL '{base}': {e}"),
            key: Some("api.base_url".into()),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("unsupported URL scheme '{}'", parsed.scheme()),
                key: Some("api.base_url".into()),
            });
        }

        if self.polling.interval.is_zero() {
            return Err(Error::Config {
                message: "polling interval must be greater than zero".into(),
                key: Some("polling.interval".into()),
            });
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff multiplier must be at least 1.0".into(),
                key: Some("retry.backoff_multiplier".into()),
            });
        }

        Ok(())
    }
}

/// API endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API, without the `/api` prefix (default: "http://localhost:3000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for JSON requests (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Timeout for a presigned file transfer (default: 10 minutes)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    pub upload_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            upload_timeout: default_upload_timeout(),
        }
    }
}

/// Status polling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between fetches while work is active, in milliseconds (default: 3000)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry, in milliseconds (default: 500)
    #[serde(default = "default_initial_delay", with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries, in milliseconds (default: 10000)
    #[serde(default = "default_max_delay", with = "millis_serde")]
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

/// Subscription plan, which bounds the size of a single upload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// 200 MB per file
    #[default]
    Free,
    /// 500 MB per file
    Starter,
    /// 1 GB per file
    Pro,
    /// 5 GB per file
    Business,
    /// 10 GB per file
    Agency,
}

impl SubscriptionTier {
    /// Largest accepted file, in megabytes
    pub fn max_file_size_mb(&self) -> u64 {
        match self {
            SubscriptionTier::Free => 200,
            SubscriptionTier::Starter => 500,
            SubscriptionTier::Pro => 1024,
            SubscriptionTier::Business => 5 * 1024,
            SubscriptionTier::Agency => 10 * 1024,
        }
    }

    /// Largest accepted file, in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb() * 1024 * 1024
    }
}

/// Client-side upload checks
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Plan of the signed-in account (default: free)
    #[serde(default)]
    pub tier: SubscriptionTier,
}

/// External tool paths (ffprobe, ffmpeg)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffprobe executable (auto-detected if None)
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Where extracted clip thumbnails are written (default: system temp dir)
    #[serde(default)]
    pub thumbnail_dir: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: None,
            ffmpeg_path: None,
            search_path: true,
            thumbnail_dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:3000".into()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(3000)
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

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
