//! Application state for the web layer.

use std::sync::Arc;

use crate::realtime::{FeedClient, RealtimeCache};
use crate::schedule::ScheduleRepository;

/// Shared application state.
///
/// Generic over the feed provider so handlers can be exercised with a
/// canned feed.
pub struct AppState<P = FeedClient> {
    /// Static schedule
    pub schedule: Arc<ScheduleRepository>,

    /// Current realtime feed
    pub realtime: Arc<RealtimeCache<P>>,
}

impl<P> AppState<P> {
    pub fn new(schedule: Arc<ScheduleRepository>, realtime: Arc<RealtimeCache<P>>) -> Self {
        Self { schedule, realtime }
    }
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            schedule: self.schedule.clone(),
            realtime: self.realtime.clone(),
        }
    }
}
