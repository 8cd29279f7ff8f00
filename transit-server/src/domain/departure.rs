//! Departures adjusted with realtime delays.

use serde::Serialize;

/// A scheduled departure with its realtime-adjusted countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AugmentedDeparture {
    pub trip_id: String,
    pub scheduled_departure_time: String,
    /// Whole minutes from now until the adjusted departure. Never negative
    /// in a returned result.
    pub departure_mins: i64,
    /// Trip headsign, if the schedule has one.
    pub destination: Option<String>,
    /// Delay applied from the realtime feed. Absent when no matching update
    /// carried a departure delay, which is different from a delay of zero.
    #[serde(rename = "realtime_offset", skip_serializing_if = "Option::is_none")]
    pub realtime_offset_seconds: Option<i64>,
}

/// Upcoming departures from one stop on one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AugmentedResult {
    pub stop_name: String,
    pub route_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub service_id: String,
    /// Sorted ascending by `departure_mins`.
    pub times: Vec<AugmentedDeparture>,
}
