//! Fusing scheduled departures with realtime delays.
//!
//! A schedule entry and a realtime stop time update refer to the same call
//! when they agree on stop identity:
//!
//! 1. both `stop_id` and `stop_sequence` are present on the update and equal
//!    to the entry's, or
//! 2. the update has no `stop_sequence` and its `stop_id` equals the entry's, or
//! 3. the update has no `stop_id` and its `stop_sequence` equals the entry's.
//!
//! An update whose `stop_sequence` is present but different never matches,
//! even when its `stop_id` does.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::domain::{AugmentedDeparture, AugmentedResult, ScheduleEntry, ServiceTime};
use crate::realtime::{RealtimeFeed, StopTimeUpdate, TripUpdate};

/// Upcoming departures for `entries`, adjusted by the delays in `feed`.
///
/// Returns `None` if there are no entries or none of them is still to come.
pub fn augment(entries: &[ScheduleEntry], feed: &RealtimeFeed, tz: Tz) -> Option<AugmentedResult> {
    augment_at(entries, feed, tz, Utc::now())
}

/// [`augment`] evaluated at a fixed instant.
pub fn augment_at(
    entries: &[ScheduleEntry],
    feed: &RealtimeFeed,
    tz: Tz,
    now: DateTime<Utc>,
) -> Option<AugmentedResult> {
    let first = entries.first()?;

    let now = now.with_timezone(&tz);
    let today = now.date_naive();
    let updates = index_by_trip(feed);

    let mut times: Vec<AugmentedDeparture> = entries
        .iter()
        .filter_map(|entry| {
            let candidates = updates
                .get(entry.trip_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            if candidates.len() > 1 {
                warn!(
                    trip_id = %entry.trip_id,
                    count = candidates.len(),
                    "multiple realtime updates for one trip"
                );
            }

            let scheduled = match ServiceTime::parse(&entry.scheduled_departure_time) {
                Ok(t) => t,
                Err(e) => {
                    warn!(trip_id = %entry.trip_id, error = %e, "skipping unparsable departure time");
                    return None;
                }
            };

            let offset = applied_delay(entry, candidates);
            let departure = scheduled.on_date(today, tz)?;
            let Some(departure) = TimeDelta::try_seconds(offset.unwrap_or(0))
                .and_then(|delay| departure.checked_add_signed(delay))
            else {
                warn!(trip_id = %entry.trip_id, delay = ?offset, "skipping out of range delay");
                return None;
            };
            let departure_mins = (departure - now).num_minutes();

            (departure_mins >= 0).then(|| AugmentedDeparture {
                trip_id: entry.trip_id.clone(),
                scheduled_departure_time: entry.scheduled_departure_time.clone(),
                departure_mins,
                destination: entry.trip_headsign.clone(),
                realtime_offset_seconds: offset,
            })
        })
        .collect();

    if times.is_empty() {
        return None;
    }
    times.sort_by_key(|d| d.departure_mins);

    Some(AugmentedResult {
        stop_name: first.stop_name.clone(),
        route_id: first.route_id.clone(),
        stop_id: first.stop_id.clone(),
        stop_sequence: first.stop_sequence,
        service_id: first.service_id.clone(),
        times,
    })
}

fn index_by_trip(feed: &RealtimeFeed) -> HashMap<&str, Vec<&TripUpdate>> {
    let mut index: HashMap<&str, Vec<&TripUpdate>> = HashMap::new();
    for update in feed.trip_updates() {
        index
            .entry(update.trip.trip_id.as_str())
            .or_default()
            .push(update);
    }
    index
}

/// The departure delay to apply to `entry`: the last matching update that
/// carries one, in feed order.
fn applied_delay(entry: &ScheduleEntry, candidates: &[&TripUpdate]) -> Option<i64> {
    candidates
        .iter()
        .flat_map(|trip| trip.stop_time_updates())
        .filter(|update| matches_stop(entry, update))
        .filter_map(StopTimeUpdate::departure_delay)
        .last()
}

pub(crate) fn matches_stop(entry: &ScheduleEntry, update: &StopTimeUpdate) -> bool {
    match (update.stop_id.as_deref(), update.stop_sequence) {
        (Some(id), Some(seq)) => id == entry.stop_id && seq == entry.stop_sequence,
        (Some(id), None) => id == entry.stop_id,
        (None, Some(seq)) => seq == entry.stop_sequence,
        (None, None) => false,
    }
}

#[cfg(test)]
#[path = "fusion_tests.rs"]
mod tests;
