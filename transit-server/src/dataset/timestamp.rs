//! Durable record of the last successful dataset import.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::ImportError;

pub const DEFAULT_TIMESTAMP_PATH: &str = "gtfs-last-update.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTimestampRecord {
    #[serde(alias = "lastUpdate")]
    pub last_update: DateTime<Utc>,
}

/// File holding a [`RefreshTimestampRecord`].
#[derive(Debug, Clone)]
pub struct RefreshTimestamp {
    path: PathBuf,
}

impl RefreshTimestamp {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last import time. A missing or unreadable record counts as
    /// never imported.
    pub async fn load(&self) -> Option<DateTime<Utc>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read refresh timestamp");
                return None;
            }
        };

        match serde_json::from_str::<RefreshTimestampRecord>(&content) {
            Ok(record) => Some(record.last_update),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt refresh timestamp");
                None
            }
        }
    }

    pub async fn save(&self, last_update: DateTime<Utc>) -> Result<(), ImportError> {
        let record = RefreshTimestampRecord { last_update };
        let json = serde_json::to_string_pretty(&record).map_err(|e| {
            ImportError::io(&self.path, std::io::Error::other(e))
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| ImportError::io(&self.path, e))
    }
}

impl Default for RefreshTimestamp {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_PATH)
    }
}
