//! Domain types for the departures server.
//!
//! Schedule rows come from the static GTFS dataset and are only valid for
//! the day they were queried on. Augmented departures are computed per
//! request and never stored.

mod departure;
mod schedule;
mod time;

pub use departure::{AugmentedDeparture, AugmentedResult};
pub use schedule::{Agency, Direction, RouteSummary, ScheduleEntry, StopOnRoute};
pub use time::{ServiceTime, TimeError};
