//! Configuration management for livehub.
//!
//! Configuration is read from `~/.config/livehub/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

pub mod interval;

pub use interval::{format_interval, parse_interval, Interval, MAX_INTERVAL_SECS};

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Route prefix served by the read API; the hub callback must stay clear of it.
pub const READ_API_PREFIX: &str = "/isLive";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub hub: HubConfig,
    pub youtube: YoutubeConfig,
    pub sync: SyncConfig,
    pub ingest: IngestConfig,
    pub schedule: ScheduleConfig,
    pub database: DatabaseConfig,
}

/// Webhook listener and the callback announced to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route the hub calls back on
    pub path: String,
    /// Public URL of `path` as reachable by the hub
    pub callback_url: String,
    /// Shared HMAC secret; deliveries must be signed with it when set
    pub secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/".to_string(),
            callback_url: "http://localhost:8080/".to_string(),
            secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub url: String,
    pub lease_seconds: u64,
    /// How long a renewal batch keeps its channels claimed
    pub subscribe_claim: Interval,
    /// Leases closer than this to expiry are renewed
    pub renew_before: Interval,
    pub batch_size: usize,
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            url: "https://pubsubhubbub.appspot.com/subscribe".to_string(),
            lease_seconds: 432_000,
            subscribe_claim: Interval::from_mins(5),
            renew_before: Interval::from_hours(1),
            batch_size: 50,
            concurrency: 10,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    pub api_key: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub channel_claim: Interval,
    /// Minimum age of the last successful poll before a channel is due again
    pub channel_interval: Interval,
    pub feed_claim: Interval,
    pub page_size: usize,
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_claim: Interval::from_mins(5),
            channel_interval: Interval::from_mins(30),
            feed_claim: Interval::from_mins(1),
            page_size: 50,
            concurrency: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub throttle_ms: u64,
    /// Deliveries published before `now - recency` are dropped
    pub recency: Interval,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 1000,
            recency: Interval::from_days(7),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub renew_every: Interval,
    pub clean_every: Interval,
    pub retention: Interval,
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            renew_every: Interval::from_mins(10),
            clean_every: Interval::from_hours(1),
            retention: Interval::from_days(14),
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path without creating it.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path: `~/.config/livehub/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("livehub").join("config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.batch_size == 0 || self.sync.page_size == 0 {
            return Err(ConfigError::Invalid(
                "batch_size and page_size must be greater than zero".into(),
            ));
        }
        if self.hub.concurrency == 0 || self.sync.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be greater than zero".into(),
            ));
        }
        if self.schedule.renew_every.as_secs() == 0 || self.schedule.clean_every.as_secs() == 0 {
            return Err(ConfigError::Invalid(
                "schedule intervals must be greater than zero".into(),
            ));
        }
        let intervals = [
            ("hub.subscribe_claim", self.hub.subscribe_claim),
            ("hub.renew_before", self.hub.renew_before),
            ("sync.channel_claim", self.sync.channel_claim),
            ("sync.channel_interval", self.sync.channel_interval),
            ("sync.feed_claim", self.sync.feed_claim),
            ("ingest.recency", self.ingest.recency),
            ("schedule.renew_every", self.schedule.renew_every),
            ("schedule.clean_every", self.schedule.clean_every),
            ("schedule.retention", self.schedule.retention),
        ];
        for (name, value) in intervals {
            if value.as_secs() > MAX_INTERVAL_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{} is out of range: {} (max {})",
                    name,
                    value,
                    Interval::from_secs(MAX_INTERVAL_SECS)
                )));
            }
        }
        if self.hub.lease_seconds > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "hub.lease_seconds is out of range: {}",
                self.hub.lease_seconds
            )));
        }
        if self.ingest.throttle_ms / 1000 > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "ingest.throttle_ms is out of range: {}",
                self.ingest.throttle_ms
            )));
        }
        if !self.server.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.path must start with '/': {}",
                self.server.path
            )));
        }
        let path = self.server.path.trim_end_matches('/');
        if path == READ_API_PREFIX || path.starts_with(&format!("{}/", READ_API_PREFIX)) {
            return Err(ConfigError::Invalid(format!(
                "server.path collides with the read API: {}",
                self.server.path
            )));
        }
        Ok(())
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# livehub configuration
#
# Durations accept "30s", "10m", "1h", "7d" or a number of seconds.

[server]
host = "127.0.0.1"
port = 8080
# Path the hub posts notifications to
path = "/"
# Public URL of that path, announced to the hub when subscribing
callback_url = "http://localhost:8080/"
# secret = "change-me"

[hub]
url = "https://pubsubhubbub.appspot.com/subscribe"
lease_seconds = 432000
subscribe_claim = "5m"
renew_before = "1h"
batch_size = 50
concurrency = 10
timeout_secs = 10

[youtube]
api_key = ""
api_base = "https://www.googleapis.com/youtube/v3"
timeout_secs = 10

[sync]
channel_claim = "5m"
channel_interval = "30m"
feed_claim = "1m"
page_size = 50
concurrency = 10

[ingest]
throttle_ms = 1000
recency = "7d"

[schedule]
renew_every = "10m"
clean_every = "1h"
retention = "14d"
run_on_start = true

[database]
# path = "/var/lib/livehub/livehub.db"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
