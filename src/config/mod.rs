//! Configuration management.
//!
//! Configuration is read from `~/.config/timetable-notifier/config.toml`
//! (or `--config <path>`) at startup. If the file doesn't exist, a default
//! configuration with comments is created.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::daemon::parse_interval;
use crate::detector::{DetectorSettings, DEFAULT_MESSAGE, DEFAULT_WORKERS};
use crate::fetcher::http_fetcher::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::normalizer::{DEFAULT_END_MARKER, DEFAULT_START_MARKER};
use crate::push::vapid::{VapidKeys, PRIVATE_KEY_ENV, PUBLIC_KEY_ENV};
use crate::push::webpush::DEFAULT_TTL_SECS;

const APP_DIR: &str = "timetable-notifier";
const DEFAULT_SITE: &str = "https://raspored.strukovnasamobor.com";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub feeds: FeedsConfig,
    pub schedule: ScheduleConfig,
    pub push: PushConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Value of `Access-Control-Allow-Origin` on every response.
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            allowed_origin: DEFAULT_SITE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub index_url: String,
    pub url_field: String,
    pub start_marker: String,
    pub end_marker: String,
    pub fetch_timeout_secs: u64,
    pub workers: usize,
    pub user_agent: String,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            index_url: format!("{}/rasporediRazreda.json", DEFAULT_SITE),
            url_field: "RASPORED".to_string(),
            start_marker: DEFAULT_START_MARKER.to_string(),
            end_marker: DEFAULT_END_MARKER.to_string(),
            fetch_timeout_secs: DEFAULT_TIMEOUT_SECS,
            workers: DEFAULT_WORKERS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FeedsConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// How often the scheduled cycle runs ("1h", "30m", ...).
    pub cycle_interval: String,
    /// How often both stores are flushed.
    pub flush_interval: String,
    /// Whether scheduled cycles notify subscribers.
    pub notify: bool,
    /// Run a silent cycle at startup to refresh fingerprints.
    pub cycle_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cycle_interval: "1h".to_string(),
            flush_interval: "1m".to_string(),
            notify: true,
            cycle_on_start: false,
        }
    }
}

impl ScheduleConfig {
    pub fn cycle_interval_secs(&self) -> Result<u64, ConfigError> {
        parse_interval(&self.cycle_interval)
    }

    pub fn flush_interval_secs(&self) -> Result<u64, ConfigError> {
        parse_interval(&self.flush_interval)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// VAPID `sub` claim (`mailto:` or `https:` URL).
    pub subject: String,
    pub message: String,
    pub ttl_secs: u32,
    pub prune_expired: bool,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SITE.to_string(),
            message: DEFAULT_MESSAGE.to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
            prune_expired: true,
            public_key: None,
            private_key: None,
        }
    }
}

impl PushConfig {
    /// The configured key pair; `VAPID_PUBLIC_KEY` / `VAPID_PRIVATE_KEY`
    /// take precedence over the file.
    pub fn vapid_keys(&self) -> Option<VapidKeys> {
        self.vapid_keys_with(|name| std::env::var(name).ok())
    }

    fn vapid_keys_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<VapidKeys> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let public = non_empty(env(PUBLIC_KEY_ENV)).or_else(|| non_empty(self.public_key.clone()))?;
        let private =
            non_empty(env(PRIVATE_KEY_ENV)).or_else(|| non_empty(self.private_key.clone()))?;
        Some(VapidKeys::new(public, private))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory (file backend) or database file (sqlite backend).
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: None,
        }
    }
}

impl StorageConfig {
    pub fn resolved_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.path {
            return Ok(expand_home(path));
        }
        let dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?.join(APP_DIR);
        Ok(match self.backend {
            StorageBackend::File => dir,
            StorageBackend::Sqlite => dir.join("state.db"),
        })
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl Config {
    /// Load configuration from `path`, or from the default path when `None`.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            tracing::info!(path = %config_path.display(), "created default config");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path: `~/.config/timetable-notifier/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_DIR).join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schedule.cycle_interval_secs()?;
        self.schedule.flush_interval_secs()?;

        if self.feeds.workers == 0 {
            return Err(ConfigError::Invalid("feeds.workers must be at least 1".into()));
        }
        if self.feeds.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "feeds.fetch_timeout_secs must be at least 1".into(),
            ));
        }
        url::Url::parse(&self.feeds.index_url)
            .map_err(|e| ConfigError::Invalid(format!("feeds.index_url: {}", e)))?;
        Ok(())
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            index_url: self.feeds.index_url.clone(),
            url_field: self.feeds.url_field.clone(),
            message: self.push.message.clone(),
            fetch_timeout: self.feeds.fetch_timeout(),
            workers: self.feeds.workers,
            prune_expired: self.push.prune_expired,
        }
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
        r##"# timetable-notifier configuration
#
# Intervals accept "45s", "30m", "1h", "1d" or a bare number of seconds.

[server]
bind = "0.0.0.0:3000"
# Sent as Access-Control-Allow-Origin on every response
allowed_origin = "https://raspored.strukovnasamobor.com"

[feeds]
# JSON object: topic -> { "<url_field>": "<schedule page url>", ... }
index_url = "https://raspored.strukovnasamobor.com/rasporediRazreda.json"
url_field = "RASPORED"

# Only the text between these markers is hashed
start_marker = '<body class="docs-gm">'
end_marker = "<script"

fetch_timeout_secs = 10
workers = 8

[schedule]
cycle_interval = "1h"
flush_interval = "1m"
# Notify subscribers on scheduled cycles
notify = true
# Refresh fingerprints (without notifying) right after startup
cycle_on_start = false

[push]
# VAPID "sub" claim
subject = "https://raspored.strukovnasamobor.com"
message = "Promjena Rasporeda!"
ttl_secs = 86400
# Remove subscriptions the push service reports as gone
prune_expired = true
# Prefer the VAPID_PUBLIC_KEY / VAPID_PRIVATE_KEY environment variables.
# Generate a pair with `timetable-notifier keys`.
# public_key = ""
# private_key = ""

[storage]
# "file" (one JSON file per store) or "sqlite"
backend = "file"
# Defaults to the platform data directory
# path = "/var/lib/timetable-notifier"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory; set storage.path")]
    NoDataDir,

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
