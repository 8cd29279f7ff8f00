//! The process-wide realtime feed cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::client::FeedProvider;
use super::error::RealtimeError;
use super::snapshot::FeedSnapshot;
use super::types::RealtimeFeed;

/// A refresh attempt that did not replace the cached feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    pub at: DateTime<Utc>,
    /// One of "fetch", "format", "snapshot".
    pub kind: &'static str,
    pub message: String,
}

/// Bookkeeping about refresh attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStatus {
    /// When the cached feed was last replaced by a refresh.
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<RefreshFailure>,
    pub successes: u64,
    pub failures: u64,
}

/// Holds the single current realtime feed.
///
/// The feed is never mutated in place. A refresh builds and validates a
/// complete new feed, persists it, and only then swaps the shared reference,
/// so readers see either the old feed or the new one in full.
pub struct RealtimeCache<P> {
    current: RwLock<Option<Arc<RealtimeFeed>>>,
    status: RwLock<RefreshStatus>,
    /// Serializes refreshes so snapshot writes and swaps happen in order.
    refresh_lock: Mutex<()>,
    provider: P,
    snapshot: FeedSnapshot,
}

impl<P: FeedProvider> RealtimeCache<P> {
    /// Create an empty cache. Call [`bootstrap`](Self::bootstrap) to load
    /// the durable snapshot before serving.
    pub fn new(provider: P, snapshot: FeedSnapshot) -> Self {
        Self {
            current: RwLock::new(None),
            status: RwLock::new(RefreshStatus::default()),
            refresh_lock: Mutex::new(()),
            provider,
            snapshot,
        }
    }

    /// Install the durable snapshot as the initial value, if one exists.
    ///
    /// Returns whether a snapshot was installed. A refresh that already
    /// completed is never overwritten by the older snapshot.
    pub async fn bootstrap(&self) -> bool {
        match self.snapshot.load().await {
            Ok(Some(feed)) => {
                let mut guard = self.current.write().await;
                if guard.is_some() {
                    return false;
                }
                info!(
                    entities = feed.entity.len(),
                    path = %self.snapshot.path().display(),
                    "loaded realtime snapshot"
                );
                *guard = Some(Arc::new(feed));
                true
            }
            Ok(None) => {
                info!(path = %self.snapshot.path().display(), "no realtime snapshot on disk");
                false
            }
            Err(e) => {
                warn!(error = %e, "ignoring unreadable realtime snapshot");
                false
            }
        }
    }

    /// Get the current feed. `None` only before the first snapshot or
    /// successful refresh.
    pub async fn get(&self) -> Option<Arc<RealtimeFeed>> {
        self.current.read().await.clone()
    }

    /// Fetch, validate, persist and install a new feed.
    ///
    /// On any failure the previous feed stays authoritative and the failure
    /// is recorded in [`status`](Self::status). Returns the number of
    /// entities in the installed feed.
    pub async fn refresh(&self) -> Result<usize, RealtimeError> {
        let _serial = self.refresh_lock.lock().await;

        match self.fetch_and_persist().await {
            Ok(feed) => {
                let count = feed.entity.len();
                *self.current.write().await = Some(Arc::new(feed));

                let mut status = self.status.write().await;
                status.last_success = Some(Utc::now());
                status.successes += 1;
                info!(entities = count, "updated realtime data");
                Ok(count)
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "realtime refresh failed; keeping previous feed");
                let mut status = self.status.write().await;
                status.last_failure = Some(RefreshFailure {
                    at: Utc::now(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
                status.failures += 1;
                Err(e)
            }
        }
    }

    async fn fetch_and_persist(&self) -> Result<RealtimeFeed, RealtimeError> {
        let payload = self.provider.fetch().await?;
        let feed = RealtimeFeed::from_json(payload)?;
        self.snapshot.save(&feed).await?;
        Ok(feed)
    }

    /// Snapshot of the refresh bookkeeping.
    pub async fn status(&self) -> RefreshStatus {
        self.status.read().await.clone()
    }
}
