//! Server configuration.
//!
//! Settings come from a JSON file (`gtfs-config.json` unless `GTFS_CONFIG`
//! names another). Every field has a default, so a file holding only the
//! agency list is enough:
//!
//! ```json
//! { "agencies": [{ "path": "feeds/dublin_bus.zip" }], "sqlitePath": "gtfs.sqlite" }
//! ```
//!
//! The realtime feed credential is read from `NTA_API_KEY`, never from the
//! file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::dataset::{AgencySource, CoordinatorConfig, DEFAULT_TIMESTAMP_PATH};
use crate::realtime::{DEFAULT_FEED_URL, DEFAULT_SNAPSHOT_PATH, FeedClientConfig};
use crate::schedule::RepositoryConfig;

pub const DEFAULT_CONFIG_PATH: &str = "gtfs-config.json";
pub const CONFIG_PATH_VAR: &str = "GTFS_CONFIG";
pub const API_KEY_VAR: &str = "NTA_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config {}: {field} {reason}", path.display())]
    Invalid {
        path: PathBuf,
        field: &'static str,
        reason: &'static str,
    },

    #[error("{var} is not set")]
    MissingCredential { var: &'static str },
}

/// Realtime feed polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    pub url: String,
    pub snapshot_path: PathBuf,
    /// Delay before periodic polling starts. The startup fetch is not delayed.
    pub warmup_secs: u64,
    pub period_secs: u64,
    pub timeout_secs: u64,
}

impl RealtimeSettings {
    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn client_config(&self, api_key: impl Into<String>) -> FeedClientConfig {
        FeedClientConfig::new(api_key)
            .with_url(&self.url)
            .with_timeout(self.timeout_secs)
    }
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            warmup_secs: 60,
            period_secs: 60,
            timeout_secs: 30,
        }
    }
}

/// Static dataset refresh settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetSettings {
    pub timestamp_path: PathBuf,
    pub freshness_days: i64,
    pub settle_millis: u64,
    /// How often the coordinator checks whether a reimport is due.
    pub check_interval_secs: u64,
}

impl DatasetSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Saturates instead of overflowing; loaded files are range checked.
    pub fn freshness_window(&self) -> TimeDelta {
        TimeDelta::try_days(self.freshness_days).unwrap_or(if self.freshness_days < 0 {
            TimeDelta::MIN
        } else {
            TimeDelta::MAX
        })
    }
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            timestamp_path: PathBuf::from(DEFAULT_TIMESTAMP_PATH),
            freshness_days: 7,
            settle_millis: 1000,
            check_interval_secs: 24 * 60 * 60,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub agencies: Vec<AgencySource>,
    pub sqlite_path: PathBuf,
    pub verbose: bool,
    pub realtime: RealtimeSettings,
    pub dataset: DatasetSettings,
    pub bind: SocketAddr,
}

impl AppConfig {
    /// Load the file named by `GTFS_CONFIG`, or `gtfs-config.json`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate(path)?;
        Ok(config)
    }

    /// Reject values the background tasks cannot run with.
    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &'static str| ConfigError::Invalid {
            path: path.to_path_buf(),
            field,
            reason,
        };

        if self.realtime.period_secs == 0 {
            return Err(invalid("realtime.periodSecs", "must be greater than zero"));
        }
        if self.dataset.check_interval_secs == 0 {
            return Err(invalid("dataset.checkIntervalSecs", "must be greater than zero"));
        }
        match TimeDelta::try_days(self.dataset.freshness_days) {
            Some(window) if window >= TimeDelta::zero() => Ok(()),
            Some(_) => Err(invalid("dataset.freshnessDays", "must not be negative")),
            None => Err(invalid("dataset.freshnessDays", "is out of range")),
        }
    }

    pub fn with_agencies(mut self, agencies: Vec<AgencySource>) -> Self {
        self.agencies = agencies;
        self
    }

    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sqlite_path = path.into();
        self
    }

    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig::new(&self.sqlite_path)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new(&self.sqlite_path, self.agencies.clone())
            .with_timestamp_path(&self.dataset.timestamp_path)
            .with_freshness_window(self.dataset.freshness_window())
            .with_settle_delay(Duration::from_millis(self.dataset.settle_millis))
            .with_verbose(self.verbose)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agencies: Vec::new(),
            sqlite_path: PathBuf::from("gtfs.sqlite"),
            verbose: false,
            realtime: RealtimeSettings::default(),
            dataset: DatasetSettings::default(),
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

/// The realtime feed credential. Missing or empty is an error.
pub fn api_key_from_env() -> Result<String, ConfigError> {
    match std::env::var(API_KEY_VAR) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::MissingCredential { var: API_KEY_VAR }),
    }
}
