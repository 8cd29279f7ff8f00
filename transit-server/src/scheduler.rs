//! Timer-driven background work.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Shortest period a task will run on.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// A unit of work repeated on a fixed period, independent of requests.
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    pub name: &'static str,

    /// Wait before the first run.
    pub initial_delay: Duration,

    pub period: Duration,
}

impl PeriodicTask {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            initial_delay: period,
            period,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Spawn the loop. `work` is called once per tick; a slow run delays the
    /// following ticks instead of firing a burst to catch up. Periods shorter
    /// than [`MIN_PERIOD`] are raised to it.
    pub fn spawn<F, Fut>(self, mut work: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = if self.period < MIN_PERIOD {
            warn!(task = self.name, period = ?self.period, "period too short, using minimum");
            MIN_PERIOD
        } else {
            self.period
        };

        tokio::spawn(async move {
            let start = Instant::now() + self.initial_delay;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                debug!(task = self.name, "running periodic task");
                work().await;
            }
        })
    }
}
