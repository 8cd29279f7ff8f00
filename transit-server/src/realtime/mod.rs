//! GTFS-Realtime feed client and cache.
//!
//! The feed is polled once at startup and then periodically after a
//! warm-up delay (the provider rate limits aggressive clients). Every
//! validated feed is written to a durable snapshot which is read back on the
//! next start, so a restart never begins cold.

mod client;
mod error;
mod snapshot;
mod store;
mod summary;
mod types;

pub use client::{DEFAULT_FEED_URL, FeedClient, FeedClientConfig, FeedProvider};
pub use error::RealtimeError;
pub use snapshot::{DEFAULT_SNAPSHOT_PATH, FeedSnapshot};
pub use store::{RealtimeCache, RefreshFailure, RefreshStatus};
pub use summary::trips_by_route;
pub use types::{
    FeedEntity, FeedHeader, RealtimeFeed, StopTimeEvent, StopTimeUpdate, TripDescriptor,
    TripUpdate,
};
