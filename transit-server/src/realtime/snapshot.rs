//! Durable on-disk copy of the last validated realtime feed.
//!
//! The snapshot lets a restarted process serve delays immediately instead of
//! waiting for the first refresh. Writes go to a sibling temporary file which
//! is then renamed over the snapshot, so a crash mid-write never leaves a
//! truncated snapshot behind.

use std::path::{Path, PathBuf};

use super::error::RealtimeError;
use super::types::RealtimeFeed;

/// Default snapshot location, relative to the working directory.
pub const DEFAULT_SNAPSHOT_PATH: &str = "gtfs-realtime-cache.json";

/// Durable snapshot file for the realtime feed.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    path: PathBuf,
}

impl FeedSnapshot {
    /// Create a snapshot handle for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot.
    ///
    /// Returns `Ok(None)` if no snapshot has been written yet. A snapshot
    /// that exists but fails validation is an error.
    pub async fn load(&self) -> Result<Option<RealtimeFeed>, RealtimeError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RealtimeError::Snapshot {
                    message: format!("failed to read {}: {}", self.path.display(), e),
                });
            }
        };

        let value: serde_json::Value =
            serde_json::from_str(&contents).map_err(|e| RealtimeError::Snapshot {
                message: format!("snapshot is not JSON: {e}"),
            })?;

        RealtimeFeed::from_json(value).map(Some)
    }

    /// Persist a feed, replacing any previous snapshot.
    ///
    /// Creates parent directories if they don't exist.
    pub async fn save(&self, feed: &RealtimeFeed) -> Result<(), RealtimeError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RealtimeError::Snapshot {
                    message: format!("failed to create snapshot directory: {e}"),
                })?;
        }

        let json = serde_json::to_vec(feed).map_err(|e| RealtimeError::Snapshot {
            message: format!("failed to serialize feed: {e}"),
        })?;

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| RealtimeError::Snapshot {
                message: format!("failed to write {}: {}", tmp.display(), e),
            })?;

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| RealtimeError::Snapshot {
                message: format!("failed to replace {}: {}", self.path.display(), e),
            })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl Default for FeedSnapshot {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_PATH)
    }
}
